//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

static PROCESS_ROLE: OnceLock<ProcessRole> = OnceLock::new();

static DEFAULT_ROLE: ProcessRole = ProcessRole::Bot;

/// Which side of the supervision boundary the current process is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessRole {
    /// The supervising process that keeps the bot alive
    Supervisor,
    /// The bot's main process (hosts the worker pool)
    Bot,
}

impl ProcessRole {
    /// Initialize the global role for the supervisor binary
    pub fn init_supervisor() -> &'static ProcessRole {
        PROCESS_ROLE.get_or_init(|| ProcessRole::Supervisor)
    }

    /// Initialize the global role for the bot process
    pub fn init_bot() -> &'static ProcessRole {
        PROCESS_ROLE.get_or_init(|| ProcessRole::Bot)
    }

    /// Get the global role, falling back to `Bot` when nothing was initialized
    pub fn current() -> &'static ProcessRole {
        PROCESS_ROLE.get().unwrap_or(&DEFAULT_ROLE)
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessRole::Supervisor => write!(f, "supervisor"),
            ProcessRole::Bot => write!(f, "bot"),
        }
    }
}

/// Pool-assigned identifier of a worker
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(u64);

impl WorkerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Opaque identifier pairing one outbound request with its reply
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key grouping interchangeable workers (e.g. `translate`, `ratelimit`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerKind(Cow<'static, str>);

impl WorkerKind {
    pub const TRANSLATE: WorkerKind = WorkerKind::from_static("translate");
    pub const RATE_LIMIT: WorkerKind = WorkerKind::from_static("ratelimit");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
