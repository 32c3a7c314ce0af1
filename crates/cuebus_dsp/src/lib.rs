//! Cuebus DSP - Routing Primitives
//!
//! This crate provides the real-time building blocks of the Cuebus engine:
//! - `CrosspointMatrix`: N×M gain matrix with trims, mute and solo
//! - `FadeRamp`: linear-in-gain fade descriptor stepped per sample
//! - `ChannelBuffer`: fixed-capacity planar sample storage
//! - dB/linear conversion with a -100 dB floor and +12 dB ceiling
//!
//! # Architecture
//!
//! Everything the audio callback touches is either owned by the audio thread
//! or stored as independent single-word atomics. Control threads write
//! parameters; the audio thread only reads them. No processing path locks
//! or allocates.

mod atomic;
mod buffer;
mod error;
mod fade;
mod gain;
mod matrix;

pub use atomic::AtomicF32;
pub use buffer::ChannelBuffer;
pub use error::DspError;
pub use fade::{fade_samples, FadeCursor, FadeRamp};
pub use gain::{clamp_gain, db_to_linear, linear_to_db, MAX_DB, MAX_GAIN, MIN_DB, SILENCE_THRESHOLD};
pub use matrix::{
    CrosspointMatrix, MatrixSnapshot, BUS_CHANNELS, CUE_MATRIX_INPUTS, DEVICE_CHANNELS,
};
