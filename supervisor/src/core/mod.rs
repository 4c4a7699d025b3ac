//! Core supervision logic: crash signatures, restart budget and process state

pub mod restart;
pub mod signatures;
pub mod state;

pub use restart::{RestartDecision, RestartTracker};
pub use signatures::{CrashSignature, SignatureSet, DEFAULT_CRASH_PATTERNS};
pub use state::{ExitReason, ManagedProcess, OutputTail, ProcessSnapshot, ProcessState};
