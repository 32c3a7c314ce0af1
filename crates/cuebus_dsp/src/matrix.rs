//! Crosspoint Matrix
//!
//! An N×M gain matrix with per-input and per-output trim, mute and solo.
//! The same type serves both routing stages: each cue owns one (file
//! channels → bus) and the engine owns one as the output patch
//! (bus → device outputs).
//!
//! # Real-time Safety
//!
//! Every parameter is an independent single-word atomic. Control threads
//! store, the audio thread loads; nothing spans two fields, so `mix()`
//! never locks, waits or allocates. Capacity is fixed at construction;
//! `set_size()` only moves the active bounds inside it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::atomic::AtomicF32;
use crate::buffer::ChannelBuffer;
use crate::error::DspError;
use crate::gain::{clamp_gain, db_to_linear, linear_to_db, MAX_DB, MIN_DB, SILENCE_THRESHOLD};

/// Input capacity of a per-cue matrix (file channels)
pub const CUE_MATRIX_INPUTS: usize = 64;

/// Width of the bus between the cue stage and the output patch
pub const BUS_CHANNELS: usize = 64;

/// Output capacity of the output patch (device channels)
pub const DEVICE_CHANNELS: usize = 32;

/// Lock-free N×M routing matrix
#[derive(Debug)]
pub struct CrosspointMatrix {
    max_inputs: usize,
    max_outputs: usize,
    num_inputs: AtomicUsize,
    num_outputs: AtomicUsize,

    /// Row-major `[input][output]` linear gains
    gains: Box<[AtomicF32]>,
    input_trim: Box<[AtomicF32]>,
    output_trim: Box<[AtomicF32]>,
    input_mute: Box<[AtomicBool]>,
    output_mute: Box<[AtomicBool]>,
    output_solo: Box<[AtomicBool]>,
}

/// Serializable copy of a matrix's control state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixSnapshot {
    pub inputs: usize,
    pub outputs: usize,
    /// Non-silent crosspoints as `(input, output, level_db)`
    pub crosspoints: Vec<(usize, usize, f32)>,
    pub input_trim_db: Vec<f32>,
    pub output_trim_db: Vec<f32>,
    pub muted_inputs: Vec<usize>,
    pub muted_outputs: Vec<usize>,
    pub soloed_outputs: Vec<usize>,
}

fn atomic_f32s(len: usize, value: f32) -> Box<[AtomicF32]> {
    (0..len).map(|_| AtomicF32::new(value)).collect()
}

fn atomic_bools(len: usize) -> Box<[AtomicBool]> {
    (0..len).map(|_| AtomicBool::new(false)).collect()
}

impl CrosspointMatrix {
    /// Create a silent matrix with the given fixed capacity, fully active.
    ///
    /// Allocates; call on the control thread only.
    pub fn new(max_inputs: usize, max_outputs: usize) -> Self {
        Self {
            max_inputs,
            max_outputs,
            num_inputs: AtomicUsize::new(max_inputs),
            num_outputs: AtomicUsize::new(max_outputs),
            gains: atomic_f32s(max_inputs * max_outputs, 0.0),
            input_trim: atomic_f32s(max_inputs, 1.0),
            output_trim: atomic_f32s(max_outputs, 1.0),
            input_mute: atomic_bools(max_inputs),
            output_mute: atomic_bools(max_outputs),
            output_solo: atomic_bools(max_outputs),
        }
    }

    /// Per-cue matrix: `CUE_MATRIX_INPUTS` × `BUS_CHANNELS`
    pub fn for_cue() -> Self {
        Self::new(CUE_MATRIX_INPUTS, BUS_CHANNELS)
    }

    /// Output patch: `BUS_CHANNELS` × `DEVICE_CHANNELS`
    pub fn for_patch() -> Self {
        Self::new(BUS_CHANNELS, DEVICE_CHANNELS)
    }

    pub fn max_inputs(&self) -> usize {
        self.max_inputs
    }

    pub fn max_outputs(&self) -> usize {
        self.max_outputs
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs.load(Ordering::Acquire)
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs.load(Ordering::Acquire)
    }

    /// Change the active dimensions and reset every control to its default
    /// (silent grid, unity trims, nothing muted or soloed).
    pub fn set_size(&self, inputs: usize, outputs: usize) -> Result<(), DspError> {
        if inputs > self.max_inputs || outputs > self.max_outputs {
            return Err(DspError::CapacityExceeded {
                inputs,
                outputs,
                max_inputs: self.max_inputs,
                max_outputs: self.max_outputs,
            });
        }
        // Shrink first so a concurrent mix never sees stale controls in range
        self.num_inputs.store(0, Ordering::Release);
        self.num_outputs.store(0, Ordering::Release);
        self.reset_controls();
        self.num_inputs.store(inputs, Ordering::Release);
        self.num_outputs.store(outputs, Ordering::Release);
        Ok(())
    }

    fn reset_controls(&self) {
        for gain in self.gains.iter() {
            gain.store(0.0, Ordering::Relaxed);
        }
        for trim in self.input_trim.iter().chain(self.output_trim.iter()) {
            trim.store(1.0, Ordering::Relaxed);
        }
        for flag in self
            .input_mute
            .iter()
            .chain(self.output_mute.iter())
            .chain(self.output_solo.iter())
        {
            flag.store(false, Ordering::Relaxed);
        }
    }

    #[inline]
    fn valid_input(&self, input: usize) -> bool {
        input < self.num_inputs()
    }

    #[inline]
    fn valid_output(&self, output: usize) -> bool {
        output < self.num_outputs()
    }

    #[inline]
    fn index(&self, input: usize, output: usize) -> usize {
        input * self.max_outputs + output
    }

    fn check_input(&self, input: usize) -> Result<(), DspError> {
        if self.valid_input(input) {
            Ok(())
        } else {
            Err(DspError::InvalidInput {
                index: input,
                count: self.num_inputs(),
            })
        }
    }

    fn check_output(&self, output: usize) -> Result<(), DspError> {
        if self.valid_output(output) {
            Ok(())
        } else {
            Err(DspError::InvalidOutput {
                index: output,
                count: self.num_outputs(),
            })
        }
    }

    fn check_level(level: f32) -> Result<(), DspError> {
        // -inf is a legitimate "off"; NaN and +inf are not
        if level.is_nan() || level == f32::INFINITY {
            Err(DspError::InvalidLevel(level))
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Crosspoints
    // ------------------------------------------------------------------

    /// Set a crosspoint in dB. Invalid indices are a silent no-op.
    pub fn set_crosspoint(&self, input: usize, output: usize, level_db: f32) {
        self.set_gain_linear(input, output, db_to_linear(level_db));
    }

    /// Validating variant of [`set_crosspoint`](Self::set_crosspoint)
    pub fn try_set_crosspoint(&self, input: usize, output: usize, level_db: f32) -> Result<(), DspError> {
        self.check_input(input)?;
        self.check_output(output)?;
        Self::check_level(level_db)?;
        self.set_crosspoint(input, output, level_db);
        Ok(())
    }

    /// Crosspoint level in dB; `MIN_DB` for invalid indices
    pub fn crosspoint(&self, input: usize, output: usize) -> f32 {
        linear_to_db(self.gain_linear(input, output))
    }

    /// Set a crosspoint as linear gain, clamped to `[0, MAX_GAIN]`
    pub fn set_gain_linear(&self, input: usize, output: usize, gain: f32) {
        if self.valid_input(input) && self.valid_output(output) {
            self.gains[self.index(input, output)].store(clamp_gain(gain), Ordering::Relaxed);
        }
    }

    /// Validating variant of [`set_gain_linear`](Self::set_gain_linear)
    pub fn try_set_gain_linear(&self, input: usize, output: usize, gain: f32) -> Result<(), DspError> {
        self.check_input(input)?;
        self.check_output(output)?;
        if !gain.is_finite() {
            return Err(DspError::InvalidLevel(gain));
        }
        self.set_gain_linear(input, output, gain);
        Ok(())
    }

    /// Crosspoint as linear gain; zero for invalid indices
    pub fn gain_linear(&self, input: usize, output: usize) -> f32 {
        if self.valid_input(input) && self.valid_output(output) {
            self.gains[self.index(input, output)].load(Ordering::Relaxed)
        } else {
            0.0
        }
    }

    pub fn clear_crosspoint(&self, input: usize, output: usize) {
        self.set_gain_linear(input, output, 0.0);
    }

    /// Silence every crosspoint; trims, mutes and solos are untouched
    pub fn clear_all(&self) {
        for gain in self.gains.iter() {
            gain.store(0.0, Ordering::Relaxed);
        }
    }

    /// Unity on the diagonal, silence elsewhere
    pub fn set_direct_routing(&self) {
        self.clear_all();
        let diagonal = self.num_inputs().min(self.num_outputs());
        for ch in 0..diagonal {
            self.set_gain_linear(ch, ch, 1.0);
        }
    }

    /// Whether any active crosspoint is above the silence threshold
    pub fn has_active_routing(&self) -> bool {
        let (inputs, outputs) = (self.num_inputs(), self.num_outputs());
        (0..inputs).any(|i| {
            (0..outputs).any(|o| self.gains[self.index(i, o)].load(Ordering::Relaxed) >= SILENCE_THRESHOLD)
        })
    }

    // ------------------------------------------------------------------
    // Trims
    // ------------------------------------------------------------------

    pub fn set_input_trim(&self, input: usize, level_db: f32) {
        if self.valid_input(input) {
            self.input_trim[input].store(db_to_linear(level_db), Ordering::Relaxed);
        }
    }

    pub fn try_set_input_trim(&self, input: usize, level_db: f32) -> Result<(), DspError> {
        self.check_input(input)?;
        Self::check_level(level_db)?;
        self.set_input_trim(input, level_db);
        Ok(())
    }

    pub fn input_trim_db(&self, input: usize) -> f32 {
        if self.valid_input(input) {
            linear_to_db(self.input_trim[input].load(Ordering::Relaxed))
        } else {
            MIN_DB
        }
    }

    pub fn set_output_trim(&self, output: usize, level_db: f32) {
        if self.valid_output(output) {
            self.output_trim[output].store(db_to_linear(level_db), Ordering::Relaxed);
        }
    }

    pub fn try_set_output_trim(&self, output: usize, level_db: f32) -> Result<(), DspError> {
        self.check_output(output)?;
        Self::check_level(level_db)?;
        self.set_output_trim(output, level_db);
        Ok(())
    }

    pub fn output_trim_db(&self, output: usize) -> f32 {
        if self.valid_output(output) {
            linear_to_db(self.output_trim[output].load(Ordering::Relaxed))
        } else {
            MIN_DB
        }
    }

    // ------------------------------------------------------------------
    // Mute / Solo
    // ------------------------------------------------------------------

    pub fn mute_input(&self, input: usize, muted: bool) {
        if self.valid_input(input) {
            self.input_mute[input].store(muted, Ordering::Relaxed);
        }
    }

    pub fn try_mute_input(&self, input: usize, muted: bool) -> Result<(), DspError> {
        self.check_input(input)?;
        self.mute_input(input, muted);
        Ok(())
    }

    pub fn mute_output(&self, output: usize, muted: bool) {
        if self.valid_output(output) {
            self.output_mute[output].store(muted, Ordering::Relaxed);
        }
    }

    pub fn try_mute_output(&self, output: usize, muted: bool) -> Result<(), DspError> {
        self.check_output(output)?;
        self.mute_output(output, muted);
        Ok(())
    }

    pub fn solo_output(&self, output: usize, soloed: bool) {
        if self.valid_output(output) {
            self.output_solo[output].store(soloed, Ordering::Relaxed);
        }
    }

    pub fn try_solo_output(&self, output: usize, soloed: bool) -> Result<(), DspError> {
        self.check_output(output)?;
        self.solo_output(output, soloed);
        Ok(())
    }

    /// Invalid inputs read as muted
    pub fn is_input_muted(&self, input: usize) -> bool {
        !self.valid_input(input) || self.input_mute[input].load(Ordering::Relaxed)
    }

    /// Invalid outputs read as muted
    pub fn is_output_muted(&self, output: usize) -> bool {
        !self.valid_output(output) || self.output_mute[output].load(Ordering::Relaxed)
    }

    pub fn is_output_soloed(&self, output: usize) -> bool {
        self.valid_output(output) && self.output_solo[output].load(Ordering::Relaxed)
    }

    /// Derived flag: any active output soloed
    pub fn solo_active(&self) -> bool {
        self.solo_active_within(self.num_outputs())
    }

    #[inline]
    fn solo_active_within(&self, outputs: usize) -> bool {
        self.output_solo[..outputs.min(self.max_outputs)]
            .iter()
            .any(|solo| solo.load(Ordering::Relaxed))
    }

    #[inline]
    fn output_renders(&self, output: usize, solo_active: bool) -> bool {
        if self.output_mute[output].load(Ordering::Relaxed) {
            return false;
        }
        !solo_active || self.output_solo[output].load(Ordering::Relaxed)
    }

    /// Total linear gain from `input` to `output` with mute, solo and trims
    /// applied, exactly as `mix()` would use it (before the silence skip).
    pub fn effective_gain(&self, input: usize, output: usize) -> f32 {
        if !self.valid_input(input) || !self.valid_output(output) {
            return 0.0;
        }
        if self.input_mute[input].load(Ordering::Relaxed)
            || !self.output_renders(output, self.solo_active())
        {
            return 0.0;
        }
        self.gains[self.index(input, output)].load(Ordering::Relaxed)
            * self.input_trim[input].load(Ordering::Relaxed)
            * self.output_trim[output].load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Audio processing
    // ------------------------------------------------------------------

    /// Accumulate `input` into `output` through the matrix:
    /// `out[o] += in[i] * gain(i,o) * trim_in[i] * trim_out[o]`.
    ///
    /// Channels beyond either buffer or the active matrix size are ignored.
    /// The output is not cleared first.
    ///
    /// # Real-time Safety
    /// No allocations, no locks. O(inputs × outputs × frames) worst case;
    /// muted/unsoloed outputs and silent crosspoints cost one load each.
    pub fn mix(&self, input: &ChannelBuffer, output: &mut ChannelBuffer, num_samples: usize) {
        let frames = num_samples.min(input.frames()).min(output.frames());
        let inputs = self.num_inputs().min(input.channels());
        let outputs = self.num_outputs().min(output.channels());
        if frames == 0 || inputs == 0 || outputs == 0 {
            return;
        }

        let solo_active = self.solo_active_within(outputs);

        for out_ch in 0..outputs {
            if !self.output_renders(out_ch, solo_active) {
                continue;
            }
            let out_trim = self.output_trim[out_ch].load(Ordering::Relaxed);
            if out_trim < SILENCE_THRESHOLD {
                continue;
            }

            for in_ch in 0..inputs {
                if self.input_mute[in_ch].load(Ordering::Relaxed) {
                    continue;
                }
                let gain = self.gains[self.index(in_ch, out_ch)].load(Ordering::Relaxed)
                    * self.input_trim[in_ch].load(Ordering::Relaxed)
                    * out_trim;
                if gain < SILENCE_THRESHOLD {
                    continue;
                }

                let src = &input.channel(in_ch)[..frames];
                let dst = &mut output.channel_mut(out_ch)[..frames];
                if gain == 1.0 {
                    for (d, s) in dst.iter_mut().zip(src) {
                        *d += *s;
                    }
                } else {
                    for (d, s) in dst.iter_mut().zip(src) {
                        *d += *s * gain;
                    }
                }
            }
        }
    }

    /// Copy of the current control state
    pub fn snapshot(&self) -> MatrixSnapshot {
        let (inputs, outputs) = (self.num_inputs(), self.num_outputs());
        let mut crosspoints = Vec::new();
        for i in 0..inputs {
            for o in 0..outputs {
                let gain = self.gain_linear(i, o);
                if gain >= SILENCE_THRESHOLD {
                    crosspoints.push((i, o, linear_to_db(gain)));
                }
            }
        }
        MatrixSnapshot {
            inputs,
            outputs,
            crosspoints,
            input_trim_db: (0..inputs).map(|i| self.input_trim_db(i)).collect(),
            output_trim_db: (0..outputs).map(|o| self.output_trim_db(o)).collect(),
            muted_inputs: (0..inputs).filter(|&i| self.is_input_muted(i)).collect(),
            muted_outputs: (0..outputs).filter(|&o| self.is_output_muted(o)).collect(),
            soloed_outputs: (0..outputs).filter(|&o| self.is_output_soloed(o)).collect(),
        }
    }

    /// Apply a snapshot produced by [`snapshot`](Self::snapshot).
    /// Entries outside the capacity are skipped.
    pub fn restore(&self, snapshot: &MatrixSnapshot) -> Result<(), DspError> {
        self.set_size(snapshot.inputs, snapshot.outputs)?;
        for &(i, o, db) in &snapshot.crosspoints {
            self.set_crosspoint(i, o, db.min(MAX_DB));
        }
        for (i, &db) in snapshot.input_trim_db.iter().enumerate() {
            self.set_input_trim(i, db);
        }
        for (o, &db) in snapshot.output_trim_db.iter().enumerate() {
            self.set_output_trim(o, db);
        }
        for &i in &snapshot.muted_inputs {
            self.mute_input(i, true);
        }
        for &o in &snapshot.muted_outputs {
            self.mute_output(o, true);
        }
        for &o in &snapshot.soloed_outputs {
            self.solo_output(o, true);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: usize = 8;

    fn ones(channels: usize) -> ChannelBuffer {
        ChannelBuffer::from_channels(&vec![vec![1.0; N]; channels])
    }

    #[test]
    fn test_new_matrix_is_silent() {
        let m = CrosspointMatrix::new(4, 4);
        assert!(!m.has_active_routing());
        assert_eq!(m.crosspoint(0, 0), MIN_DB);
        assert!(m.input_trim_db(0).abs() < 1e-5);

        let mut out = ChannelBuffer::new(4, N);
        m.mix(&ones(4), &mut out, N);
        assert_eq!(out.peak(0, N), 0.0);
    }

    #[test]
    fn test_crosspoint_round_trip() {
        let m = CrosspointMatrix::new(4, 4);
        for &db in &[-100.0, -60.0, -6.0, 0.0, 6.0, 12.0] {
            m.set_crosspoint(1, 2, db);
            assert!((m.crosspoint(1, 2) - db).abs() < 1e-3, "{db}");
        }
    }

    #[test]
    fn test_crosspoint_clamped_to_max() {
        let m = CrosspointMatrix::new(2, 2);
        m.set_crosspoint(0, 0, 30.0);
        assert!((m.crosspoint(0, 0) - MAX_DB).abs() < 1e-3);
        m.set_gain_linear(0, 1, 100.0);
        assert!((m.gain_linear(0, 1) - crate::gain::MAX_GAIN).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_indices_are_noops() {
        let m = CrosspointMatrix::new(2, 2);
        m.set_crosspoint(5, 0, 0.0);
        m.set_crosspoint(0, 5, 0.0);
        assert_eq!(m.crosspoint(5, 0), MIN_DB);
        assert!(!m.has_active_routing());
        assert!(m.is_input_muted(9));
        assert!(m.try_set_crosspoint(5, 0, 0.0).is_err());
        assert!(m.try_set_crosspoint(0, 5, 0.0).is_err());
        assert!(m.try_set_crosspoint(0, 0, f32::NAN).is_err());
        assert!(m.try_set_crosspoint(0, 0, 0.0).is_ok());
    }

    #[test]
    fn test_mix_accumulates_with_gain() {
        let m = CrosspointMatrix::new(2, 2);
        m.set_gain_linear(0, 0, 0.5);
        m.set_gain_linear(1, 0, 0.25);
        m.set_gain_linear(1, 1, 1.0);

        let mut out = ChannelBuffer::from_channels(&[vec![0.1; N], vec![0.0; N]]);
        m.mix(&ones(2), &mut out, N);
        assert!((out.channel(0)[0] - 0.85).abs() < 1e-6);
        assert!((out.channel(1)[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_trims_multiply() {
        let m = CrosspointMatrix::new(1, 1);
        m.set_crosspoint(0, 0, 0.0);
        m.set_input_trim(0, -6.0);
        m.set_output_trim(0, -6.0);
        let mut out = ChannelBuffer::new(1, N);
        m.mix(&ones(1), &mut out, N);
        let expected = db_to_linear(-12.0);
        assert!((out.channel(0)[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_input_mute_wins_over_solo() {
        let m = CrosspointMatrix::new(2, 2);
        m.set_direct_routing();
        m.solo_output(0, true);
        m.mute_input(0, true);

        let mut out = ChannelBuffer::new(2, N);
        m.mix(&ones(2), &mut out, N);
        assert_eq!(out.peak(0, N), 0.0);
        assert_eq!(out.peak(1, N), 0.0);
        assert_eq!(m.effective_gain(0, 0), 0.0);
    }

    #[test]
    fn test_solo_exclusivity() {
        let m = CrosspointMatrix::new(1, 3);
        for o in 0..3 {
            m.set_crosspoint(0, o, 0.0);
        }
        m.solo_output(1, true);
        m.solo_output(2, true);
        m.mute_output(2, true);
        assert!(m.solo_active());

        let mut out = ChannelBuffer::new(3, N);
        m.mix(&ones(1), &mut out, N);
        assert_eq!(out.peak(0, N), 0.0);
        assert_eq!(out.peak(1, N), 1.0);
        assert_eq!(out.peak(2, N), 0.0, "soloed but muted output stays silent");

        m.solo_output(1, false);
        m.solo_output(2, false);
        m.mute_output(2, false);
        let mut out = ChannelBuffer::new(3, N);
        m.mix(&ones(1), &mut out, N);
        for o in 0..3 {
            assert_eq!(out.peak(o, N), 1.0);
        }
    }

    #[test]
    fn test_silence_threshold_skips() {
        let m = CrosspointMatrix::new(1, 1);
        m.set_crosspoint(0, 0, -90.0);
        let mut out = ChannelBuffer::new(1, N);
        m.mix(&ones(1), &mut out, N);
        assert_eq!(out.peak(0, N), 0.0);
    }

    #[test]
    fn test_mix_ignores_extra_channels_and_frames() {
        let m = CrosspointMatrix::new(2, 2);
        m.set_direct_routing();
        let mut out = ChannelBuffer::new(1, 4);
        m.mix(&ones(3), &mut out, 100);
        assert_eq!(out.channel(0), &[1.0; 4]);
    }

    #[test]
    fn test_set_size_resets_and_bounds() {
        let m = CrosspointMatrix::new(8, 8);
        m.set_crosspoint(7, 7, 0.0);
        m.mute_output(3, true);
        m.set_size(2, 4).unwrap();
        assert_eq!(m.num_inputs(), 2);
        assert_eq!(m.num_outputs(), 4);
        assert!(!m.has_active_routing());
        assert!(!m.is_output_muted(3));
        m.set_crosspoint(7, 7, 0.0);
        assert_eq!(m.crosspoint(7, 7), MIN_DB);
        assert!(m.set_size(9, 1).is_err());
    }

    #[test]
    fn test_clear_keeps_trims_and_mutes() {
        let m = CrosspointMatrix::new(2, 2);
        m.set_direct_routing();
        m.set_input_trim(0, -6.0);
        m.mute_output(1, true);

        m.clear_crosspoint(0, 0);
        assert_eq!(m.gain_linear(0, 0), 0.0);
        assert_eq!(m.gain_linear(1, 1), 1.0);

        m.clear_all();
        assert!(!m.has_active_routing());
        assert!((m.input_trim_db(0) + 6.0).abs() < 1e-3);
        assert!(m.is_output_muted(1));
    }

    #[test]
    fn test_direct_routing() {
        let m = CrosspointMatrix::new(3, 2);
        m.set_direct_routing();
        assert_eq!(m.gain_linear(0, 0), 1.0);
        assert_eq!(m.gain_linear(1, 1), 1.0);
        assert_eq!(m.gain_linear(2, 0), 0.0);
        assert_eq!(m.gain_linear(0, 1), 0.0);
    }

    #[test]
    fn test_snapshot_restore() {
        let m = CrosspointMatrix::new(4, 4);
        m.set_crosspoint(0, 1, -6.0);
        m.set_output_trim(2, -3.0);
        m.mute_input(3, true);
        m.solo_output(1, true);
        let snap = m.snapshot();
        assert_eq!(snap.crosspoints.len(), 1);

        let json = serde_json::to_string(&snap).unwrap();
        let restored: MatrixSnapshot = serde_json::from_str(&json).unwrap();
        let other = CrosspointMatrix::new(4, 4);
        other.restore(&restored).unwrap();
        assert!((other.crosspoint(0, 1) + 6.0).abs() < 1e-3);
        assert!((other.output_trim_db(2) + 3.0).abs() < 1e-3);
        assert!(other.is_input_muted(3));
        assert!(other.is_output_soloed(1));
    }
}
