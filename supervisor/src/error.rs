//! Supervisor-specific error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to signal child {pid}: {message}")]
    SignalFailed { pid: u32, message: String },

    #[error("Failed to write failure marker {path}: {message}")]
    MarkerWriteFailed { path: PathBuf, message: String },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Supervisor is no longer running")]
    ChannelClosed,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;

impl SupervisorError {
    pub fn config(field: impl Into<String>) -> Self {
        SupervisorError::ConfigurationError { field: field.into() }
    }
}
