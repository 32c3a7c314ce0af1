//! Decibel / linear gain conversion
//!
//! All routing controls take levels in dB at the API boundary and store
//! linear gain. `-100 dB` is the floor and maps to exactly zero.

/// Level reported for silence and for reads of invalid indices
pub const MIN_DB: f32 = -100.0;

/// Highest level any gain stage accepts
pub const MAX_DB: f32 = 12.0;

/// Linear equivalent of [`MAX_DB`] (~3.98)
pub const MAX_GAIN: f32 = 3.981_071_7;

/// Gains below this (-80 dB) are skipped when mixing
pub const SILENCE_THRESHOLD: f32 = 1.0e-4;

/// Convert dB to linear amplitude, clamped to `[0, MAX_GAIN]`
///
/// Formula: amplitude = 10^(dB/20)
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    if db.is_nan() || db <= MIN_DB {
        return 0.0;
    }
    10.0_f32.powf(db.min(MAX_DB) / 20.0)
}

/// Convert linear amplitude to dB, floored at [`MIN_DB`]
#[inline]
pub fn linear_to_db(gain: f32) -> f32 {
    if gain.is_nan() || gain <= 0.0 {
        return MIN_DB;
    }
    (20.0 * gain.log10()).max(MIN_DB)
}

/// Clamp a linear gain into the legal range
#[inline]
pub fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        0.0
    } else {
        gain.clamp(0.0, MAX_GAIN)
    }
}
