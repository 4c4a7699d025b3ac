//! Shared types for the bot resilience layer
//!
//! Contains the identifiers, message envelopes and logging helpers used by
//! both the supervisor and the in-process worker pool.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use errors::*;
pub use types::*;

pub use messages::{
    // Pool ↔ worker envelopes
    ReplyBody, WorkerEnvelope, WorkerMessage, WorkerReply,

    // Task payloads
    BatchOutcome, CountdownEntry, Partition, RateLimitRequest, TranslateReply, TranslateRequest,

    // Dashboard snapshot
    KindStats, WorkerPoolStats,
};
