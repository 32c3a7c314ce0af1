//! Linear Fade Ramps
//!
//! A fade is linear in gain (not equal-power): each sample moves the gain
//! by a fixed step toward the target and the last sample lands on the
//! target exactly.
//!
//! `FadeRamp` holds the shared descriptor as independent atomics. The audio
//! thread copies it into a [`FadeCursor`] at the top of a block, steps the
//! cursor per sample, and writes it back at the end of the block.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::atomic::AtomicF32;

/// Number of samples a fade of `seconds` spans at `sample_rate`
///
/// Zero or negative durations give zero (no ramp).
pub fn fade_samples(seconds: f64, sample_rate: u32) -> u64 {
    if !(seconds > 0.0) || sample_rate == 0 {
        return 0;
    }
    (seconds * sample_rate as f64).ceil() as u64
}

/// Shared fade descriptor
#[derive(Debug)]
pub struct FadeRamp {
    active: AtomicBool,
    current: AtomicF32,
    target: AtomicF32,
    step: AtomicF32,
    remaining: AtomicU64,
}

impl FadeRamp {
    pub fn new(gain: f32) -> Self {
        Self {
            active: AtomicBool::new(false),
            current: AtomicF32::new(gain),
            target: AtomicF32::new(gain),
            step: AtomicF32::new(0.0),
            remaining: AtomicU64::new(0),
        }
    }

    /// Install a ramp from `from` to `to` spanning `total_samples`.
    ///
    /// `active` is cleared first and set last, so a reader that catches the
    /// fields half-written sees an inactive ramp holding `from`.
    pub fn install(&self, from: f32, to: f32, total_samples: u64) {
        self.store(FadeCursor::ramp(from, to, total_samples));
    }

    /// Jump to `gain` with no ramp
    pub fn set_gain(&self, gain: f32) {
        self.store(FadeCursor::constant(gain));
    }

    pub fn gain(&self) -> f32 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn target(&self) -> f32 {
        self.target.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Relaxed)
    }

    /// Copy the descriptor into audio-thread locals
    #[inline]
    pub fn load(&self) -> FadeCursor {
        let active = self.active.load(Ordering::Acquire);
        FadeCursor {
            active,
            current: self.current.load(Ordering::Relaxed),
            target: self.target.load(Ordering::Relaxed),
            step: self.step.load(Ordering::Relaxed),
            remaining: self.remaining.load(Ordering::Relaxed),
        }
    }

    /// Publish a cursor back to the shared descriptor
    #[inline]
    pub fn store(&self, cursor: FadeCursor) {
        self.active.store(false, Ordering::Release);
        self.current.store(cursor.current, Ordering::Relaxed);
        self.target.store(cursor.target, Ordering::Relaxed);
        self.step.store(cursor.step, Ordering::Relaxed);
        self.remaining.store(cursor.remaining, Ordering::Relaxed);
        self.active.store(cursor.active, Ordering::Release);
    }
}

impl Default for FadeRamp {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Plain-value fade state stepped on the audio thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeCursor {
    pub active: bool,
    pub current: f32,
    pub target: f32,
    pub step: f32,
    pub remaining: u64,
}

impl FadeCursor {
    pub fn constant(gain: f32) -> Self {
        Self {
            active: false,
            current: gain,
            target: gain,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Ramp from `from` to `to`; `step = (to - from) / total_samples`
    /// (±1/total for full-scale fades). Zero samples jumps straight to `to`.
    pub fn ramp(from: f32, to: f32, total_samples: u64) -> Self {
        if total_samples == 0 {
            return Self::constant(to);
        }
        Self {
            active: true,
            current: from,
            target: to,
            step: (to - from) / total_samples as f32,
            remaining: total_samples,
        }
    }

    /// Advance one sample and return the gain to apply to it
    #[inline]
    pub fn next_gain(&mut self) -> f32 {
        if self.active {
            self.current += self.step;
            if (self.step > 0.0 && self.current > self.target)
                || (self.step < 0.0 && self.current < self.target)
            {
                self.current = self.target;
            }
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                self.current = self.target;
                self.active = false;
            }
        }
        self.current
    }

    /// A finished ramp whose gain has reached zero
    #[inline]
    pub fn is_silent(&self) -> bool {
        !self.active && self.current <= 0.0
    }
}
