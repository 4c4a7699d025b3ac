//! Supervised process state

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

use super::restart::RestartTracker;
use crate::services::ChildProcess;

/// Lines of child output kept for the failure marker
pub const OUTPUT_TAIL_LINES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Restarting,
    Terminating,
    /// Restart budget exhausted; only an operator restart leaves this state
    Failed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Restarting => "restarting",
            ProcessState::Terminating => "terminating",
            ProcessState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why the child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Code(i32),
    Signaled(i32),
    Unknown,
}

impl ExitReason {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitReason::Code(0))
    }

    pub fn description(&self) -> String {
        match self {
            ExitReason::Code(code) => format!("exited with code {code}"),
            ExitReason::Signaled(signal) => format!("killed by signal {}", signal_name(*signal)),
            ExitReason::Unknown => "unknown reason".to_string(),
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

impl From<std::process::ExitStatus> for ExitReason {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitReason::Code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitReason::Signaled(signal);
            }
        }

        ExitReason::Unknown
    }
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    match nix::sys::signal::Signal::try_from(signal) {
        Ok(sig) => format!("{} ({signal})", sig.as_str()),
        Err(_) => signal.to_string(),
    }
}

#[cfg(not(unix))]
fn signal_name(signal: i32) -> String {
    signal.to_string()
}

/// Bounded ring of the most recent output lines
#[derive(Debug, Clone)]
pub struct OutputTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for OutputTail {
    fn default() -> Self {
        Self::new(OUTPUT_TAIL_LINES)
    }
}

/// The one supervised child and its lifecycle bookkeeping
pub struct ManagedProcess {
    pub child: Option<ChildProcess>,
    pub state: ProcessState,
    pub tracker: RestartTracker,
    pub is_shutting_down: bool,
    /// Incremented on every successful spawn
    pub generation: u64,
    pub output_tail: OutputTail,
}

impl ManagedProcess {
    pub fn new(tracker: RestartTracker) -> Self {
        Self {
            child: None,
            state: ProcessState::Stopped,
            tracker,
            is_shutting_down: false,
            generation: 0,
            output_tail: OutputTail::default(),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(ChildProcess::pid)
    }

    pub fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            pid: self.pid(),
            state: self.state,
            restart_count: self.tracker.restart_count(),
            last_crash_time: self.tracker.last_crash_time(),
            is_shutting_down: self.is_shutting_down,
            generation: self.generation,
        }
    }
}

/// Point-in-time view returned by `SupervisorHandle::status`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSnapshot {
    pub pid: Option<u32>,
    pub state: ProcessState,
    pub restart_count: u32,
    pub last_crash_time: Option<DateTime<Utc>>,
    pub is_shutting_down: bool,
    pub generation: u64,
}
