//! Message types for the bot resilience layer
//!
//! This module organizes all in-process messages by category:
//! - `worker`: pool ↔ worker envelopes and replies
//! - `tasks`: task-specific payloads carried inside the envelopes
//! - `stats`: read-only pool snapshots for dashboards

pub mod stats;
pub mod tasks;
pub mod worker;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{SharedError, SharedResult};

pub use stats::{KindStats, WorkerPoolStats};

pub use tasks::{BatchOutcome, CountdownEntry, Partition, RateLimitRequest, TranslateReply, TranslateRequest};

pub use worker::{ReplyBody, WorkerEnvelope, WorkerMessage, WorkerReply};

/// Encode a typed payload into the untyped form carried by envelopes
pub fn encode_payload<T: Serialize>(payload: &T) -> SharedResult<serde_json::Value> {
    serde_json::to_value(payload).map_err(|e| SharedError::SerializationError { message: e.to_string() })
}

/// Decode an envelope payload into its typed form
pub fn decode_payload<T: DeserializeOwned>(payload: serde_json::Value) -> SharedResult<T> {
    serde_json::from_value(payload).map_err(|e| SharedError::DeserializationError { message: e.to_string() })
}
