//! Command Error Types

use cuebus_core::EngineError;
use thiserror::Error;

/// Everything a request can fail with, engine errors included
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommandError {
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::UnknownCommand(_) => "UNKNOWN_COMMAND",
            CommandError::InvalidRequest(_) => "INVALID_REQUEST",
            CommandError::MissingParameter(_) => "MISSING_PARAMETER",
            CommandError::InvalidParameter(_) => "INVALID_PARAMETER",
            CommandError::Engine(e) => e.code(),
            CommandError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;
