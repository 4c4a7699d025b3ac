//! Process supervisor for the chat bot
//!
//! Keeps the bot's main process alive: restarts it after crashes within a
//! restart budget, forces a restart when fatal output is seen, and leaves a
//! failure marker behind when the budget runs out.

pub mod config;
pub mod core;
pub mod error;
pub mod services;
pub mod supervisor;
pub mod traits;

// Re-export commonly used types
pub use config::SupervisorConfig;
pub use crate::core::{CrashSignature, ExitReason, ProcessSnapshot, ProcessState, RestartDecision, RestartTracker};
pub use error::{SupervisorError, SupervisorResult};
pub use services::{FailureReport, LogSink, MarkerFileReporter};
pub use supervisor::{Supervisor, SupervisorEvent, SupervisorExit, SupervisorHandle};
pub use traits::FailureReporter;
