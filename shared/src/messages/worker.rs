//! Pool ↔ worker envelopes
//!
//! Outbound messages are wrapped as `{id, data}`, inbound replies as
//! `{id, body}`. The correlation id is the only thing the pool uses to route
//! a reply back to the caller that posted the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::CorrelationId;

/// Request envelope sent from the pool to a worker
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorkerEnvelope {
    pub id: CorrelationId,
    pub data: WorkerMessage,
}

/// What a worker is asked to do
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Liveness probe, answered immediately with a pong
    Ping,
    /// Task-specific payload interpreted by the worker's protocol
    Task(serde_json::Value),
}

/// Reply envelope sent from a worker back to the pool
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorkerReply {
    pub id: CorrelationId,
    pub body: ReplyBody,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyBody {
    Pong { timestamp: DateTime<Utc> },
    Data(serde_json::Value),
    Error { error: String },
}

impl WorkerReply {
    pub fn pong(id: CorrelationId) -> Self {
        Self {
            id,
            body: ReplyBody::Pong { timestamp: Utc::now() },
        }
    }

    pub fn data(id: CorrelationId, value: serde_json::Value) -> Self {
        Self {
            id,
            body: ReplyBody::Data(value),
        }
    }

    pub fn error(id: CorrelationId, error: impl Into<String>) -> Self {
        Self {
            id,
            body: ReplyBody::Error { error: error.into() },
        }
    }
}
