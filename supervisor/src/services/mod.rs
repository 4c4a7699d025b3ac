//! Real service implementations used by the supervisor

pub mod child;
pub mod log_sink;
pub mod marker;

pub use child::{ChildProcess, OutputLine, OutputStream};
pub use log_sink::LogSink;
pub use marker::{FailureReport, MarkerFileReporter};
