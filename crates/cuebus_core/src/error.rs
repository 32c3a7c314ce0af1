//! Engine Error Types

use thiserror::Error;

/// Errors that can occur in the engine's control plane.
///
/// Nothing on the audio path returns these; failures there degrade to
/// silence for the affected cue or route.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid parameter: {0}")]
    Validation(String),

    #[error("Cue not found: {0}")]
    CueNotFound(String),

    #[error("Cue already exists: {0}")]
    CueExists(String),

    #[error("Cue is not loaded: {0}")]
    NotLoaded(String),

    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("No audio devices found")]
    NoDevicesFound,

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("Failed to play audio stream: {0}")]
    StreamPlay(String),

    #[error("Stream configuration error: {0}")]
    Config(String),

    #[error("Engine not running")]
    NotRunning,

    #[error("DSP error: {0}")]
    DspError(#[from] cuebus_dsp::DspError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable error code used in the structured response envelope
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) | EngineError::DspError(_) => "VALIDATION_ERROR",
            EngineError::CueNotFound(_) => "NOT_FOUND",
            EngineError::CueExists(_) => "ALREADY_EXISTS",
            EngineError::NotLoaded(_) => "NOT_LOADED",
            EngineError::Io { .. }
            | EngineError::Decode { .. }
            | EngineError::UnsupportedFormat(_) => "IO_ERROR",
            EngineError::NoDevicesFound
            | EngineError::Device(_)
            | EngineError::StreamBuild(_)
            | EngineError::StreamPlay(_)
            | EngineError::Config(_)
            | EngineError::NotRunning => "DEVICE_ERROR",
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
