//! Message Types for Thread Communication
//!
//! Notices flow from the audio thread -> control thread over an SPSC ring.
//! Events flow from the control thread -> host over a channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cue::CueState;

/// Fixed-size fact reported by the audio thread
///
/// Must stay `Copy`: pushing one is the only thing the render path is
/// allowed to do besides arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// A non-looping cue reached the end of its audio
    CueEnded { handle: u64 },

    /// A fade-to-zero stop completed
    CueFadedOut { handle: u64 },

    /// A callback arrived later than its block duration allows
    Dropout { late_micros: u64 },
}

/// How serious an [`Event::AudioError`] is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

/// Asynchronous notifications pushed to the host
///
/// Serialized as `{"event": <name>, "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Event {
    /// Periodic engine health report
    PerformanceStats {
        cpu_usage: f32,
        dropouts: u64,
        memory_usage: u64,
    },

    /// A cue changed state or reported its position
    PlaybackStatus {
        cue_id: String,
        status: CueState,
        current_time: f64,
        duration: f64,
    },

    /// Something went wrong outside a request/response exchange
    AudioError {
        #[serde(rename = "type")]
        kind: String,
        severity: Severity,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Output device opened
    DeviceStarted {
        device_name: String,
        sample_rate: u32,
        buffer_size: u32,
    },

    /// Output device closed
    DeviceStopped,
}

impl Event {
    /// Create an error event from any error type
    pub fn audio_error<E: std::fmt::Display>(kind: &str, severity: Severity, err: E) -> Self {
        Event::AudioError {
            kind: kind.to_string(),
            severity,
            message: err.to_string(),
            timestamp: Utc::now(),
        }
    }
}
