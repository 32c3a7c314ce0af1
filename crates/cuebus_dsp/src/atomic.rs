//! Atomic f32 cell
//!
//! `AtomicF32` doesn't exist in std, so values are stored as their bit
//! pattern in an `AtomicU32`. Loads and stores are single-word and
//! wait-free; Relaxed ordering is enough for independent parameters.

use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    #[inline]
    pub fn store(&self, value: f32, order: Ordering) {
        self.0.store(value.to_bits(), order);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}
