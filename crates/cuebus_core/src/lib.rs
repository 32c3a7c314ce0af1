//! Cuebus Core - Cue Playback Engine
//!
//! This crate provides the engine behind Cuebus:
//! - Cues: decoded audio files with their own routing matrix and transport
//! - The output patch mapping the shared bus onto device outputs
//! - The real-time block pipeline and its performance monitor
//! - Swappable audio backends (cpal hardware, offline pumping)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Control Thread                          │
//! │   host ──commands──▶ Engine ──events──▶ host                │
//! └─────────────────────────────────────────────────────────────┘
//!                 │ ArcSwap<CueSet> + atomics   ▲ rtrb notices
//!                 ▼                             │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Audio Thread                           │
//! │   Cue ─matrix─▶ Bus (64) ─patch─▶ Device (≤32) ─▶ backend   │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod backend;
mod config;
mod cue;
mod decoder;
mod device;
mod engine;
mod error;
mod message;
mod patch;
mod renderer;
mod settings;
mod stream;

pub use backend::{AudioBackend, DeviceConfig, OfflineBackend, OfflineHandle, RenderCallback, OFFLINE_DEVICE_NAME};
pub use config::{EngineConfig, StreamConfig};
pub use cue::{Cue, CueState, CueStatus, RenderOutcome};
pub use decoder::{AudioDecoder, DecodedAudio, MemoryDecoder, SymphoniaDecoder};
pub use device::AudioDevice;
pub use engine::{Engine, EngineStatus, MatrixTarget, PATCH_TARGET};
pub use error::{EngineError, EngineResult};
pub use message::{Event, Notice, Severity};
pub use patch::{OutputPatch, PatchSnapshot};
pub use renderer::{BlockRenderer, CueSet, PerformanceMonitor, SharedState};
pub use settings::HostSettings;
pub use stream::CpalBackend;

// Re-export DSP types for convenience
pub use cuebus_dsp::{CrosspointMatrix, MatrixSnapshot, BUS_CHANNELS, DEVICE_CHANNELS, MAX_GAIN, MIN_DB};
