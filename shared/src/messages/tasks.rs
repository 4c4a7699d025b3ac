//! Task payloads carried inside worker envelopes

use serde::{Deserialize, Serialize};

/// Translation request `{text, from, to}`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TranslateRequest {
    pub text: String,
    pub from: String,
    pub to: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TranslateReply {
    pub translation: String,
}

/// Per-user countdown record (cooldowns, command limits)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CountdownEntry {
    pub uid: String,
    /// Remaining time in milliseconds
    pub time_left: i64,
}

impl CountdownEntry {
    pub fn new(uid: impl Into<String>, time_left: i64) -> Self {
        Self {
            uid: uid.into(),
            time_left,
        }
    }
}

/// Rate-limit bookkeeping requests
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RateLimitRequest {
    /// Decrement every countdown and split active from expired entries
    Process {
        users: Vec<CountdownEntry>,
        limits: Vec<CountdownEntry>,
        decrement: i64,
    },
}

/// One collection split into still-active entries and expired uids
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    pub keep: Vec<CountdownEntry>,
    pub expired: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub users: Partition,
    pub limits: Partition,
}
