//! Shared logging utilities for consistent tracing across both processes

use crate::types::ProcessRole;
use chrono::{DateTime, Utc};
use tracing::{error, info};
use tracing_subscriber::fmt::MakeWriter;

/// Build the per-role env filter directive
fn level_filter(role: &ProcessRole, log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");

    match role {
        ProcessRole::Supervisor => format!("supervisor={base_level},shared={base_level}"),
        ProcessRole::Bot => format!("workers={base_level},shared={base_level},reqwest=warn,hyper=warn"),
    }
}

/// Initialize tracing with stdout output only
pub fn init_tracing(log_level: Option<&str>) {
    init_tracing_with_sink(log_level, None::<fn() -> std::io::Stderr>);
}

/// Initialize tracing with an optional secondary sink (plain, timestamped lines)
///
/// The sink receives the same events as stdout without ANSI colouring, which
/// keeps the file readable when tailed by an operator.
pub fn init_tracing_with_sink<W>(log_level: Option<&str>, sink: Option<W>)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let directive = level_filter(ProcessRole::current(), log_level);

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let sink_layer = sink.map(|writer| {
        fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(writer)
    });

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new(&directive))
        .with(fmt_layer)
        .with(sink_layer)
        .try_init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for process-aware info logging
#[macro_export]
macro_rules! process_info {
    ($process:expr, $($arg:tt)*) => {
        tracing::info!(
            process = %$process,
            timestamp = shared::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware warning logging
#[macro_export]
macro_rules! process_warn {
    ($process:expr, $($arg:tt)*) => {
        tracing::warn!(
            process = %$process,
            timestamp = shared::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware error logging
#[macro_export]
macro_rules! process_error {
    ($process:expr, $($arg:tt)*) => {
        tracing::error!(
            process = %$process,
            timestamp = shared::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware debug logging
#[macro_export]
macro_rules! process_debug {
    ($process:expr, $($arg:tt)*) => {
        tracing::debug!(
            process = %$process,
            timestamp = shared::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(process: &ProcessRole, details: &str) {
    info!(
        process = %process,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(process: &ProcessRole, reason: &str) {
    info!(
        process = %process,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(process: &ProcessRole, context: &str, error: &dyn std::fmt::Display) {
    error!(
        process = %process,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(process: &ProcessRole, message: &str) {
    info!(
        process = %process,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_per_role() {
        assert_eq!(
            level_filter(&ProcessRole::Supervisor, Some("debug")),
            "supervisor=debug,shared=debug"
        );
        assert!(level_filter(&ProcessRole::Bot, None).starts_with("workers=info"));
    }

    #[derive(Clone, Default)]
    struct Capture(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_lifecycle_helpers_emit_at_info() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            log_startup(&ProcessRole::Supervisor, "supervisor for 'node index.js'");
            log_shutdown(&ProcessRole::Supervisor, "Received SIGINT");
            log_success(&ProcessRole::Supervisor, "Supervisor exited cleanly");
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Starting supervisor for 'node index.js'"));
        assert!(output.contains("Shutting down: Received SIGINT"));
        assert!(output.contains("Supervisor exited cleanly"));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = format_timestamp();
        // HH:MM:SS.mmm
        assert_eq!(ts.len(), 12);
        assert_eq!(&ts[2..3], ":");
    }
}
