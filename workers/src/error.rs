//! Worker pool error types

use std::time::Duration;
use thiserror::Error;

use shared::{SharedError, WorkerId, WorkerKind};

/// Result type for pool and caller-facing operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Result type for task protocol handlers running inside a worker
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors surfaced to callers of the pool and the utility API
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("No task protocol registered for worker kind '{kind}'")]
    UnknownKind { kind: WorkerKind },

    #[error("Unknown worker: {worker_id}")]
    UnknownWorker { worker_id: WorkerId },

    #[error("Worker {worker_id} stopped before replying")]
    WorkerGone { worker_id: WorkerId },

    #[error("No reply from {worker_id} within {timeout:?}")]
    ReplyTimeout { worker_id: WorkerId, timeout: Duration },

    #[error("Request to {worker_id} was cancelled")]
    Cancelled { worker_id: WorkerId },

    #[error("{kind} task failed: {message}")]
    Task { kind: WorkerKind, message: String },

    #[error("Unexpected reply from {worker_id}: {message}")]
    UnexpectedReply { worker_id: WorkerId, message: String },

    #[error("Invalid pool configuration: {message}")]
    Config { message: String },

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),
}

/// Errors raised by a task protocol while handling one request
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("translation failed: {message}")]
    Translation { message: String },

    #[error("translation timeout")]
    TranslationTimeout { timeout: Duration },

    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),
}

impl PoolError {
    pub fn config(message: impl Into<String>) -> Self {
        PoolError::Config { message: message.into() }
    }
}

impl WorkerError {
    pub fn translation(message: impl Into<String>) -> Self {
        WorkerError::Translation { message: message.into() }
    }

    pub fn invalid_payload(message: impl std::fmt::Display) -> Self {
        WorkerError::InvalidPayload {
            message: message.to_string(),
        }
    }
}
