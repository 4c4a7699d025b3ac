//! Supervisor binary entry point

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shared::{logging, process_debug, ProcessRole};
use supervisor::{
    LogSink, MarkerFileReporter, Supervisor, SupervisorConfig, SupervisorError, SupervisorHandle, SupervisorResult,
};

/// Keep the bot process alive across crashes
#[derive(Parser)]
#[command(name = "supervisor")]
#[command(about = "Runs a command and restarts it when it crashes or prints fatal errors")]
pub struct Args {
    /// Do not restart the child after it exits
    #[arg(long)]
    pub no_auto_restart: bool,

    /// Restarts allowed within the reset window before giving up
    #[arg(long, default_value_t = 5)]
    pub max_restarts: u32,

    /// Delay before relaunching a crashed child, in milliseconds
    #[arg(long, default_value_t = 3000)]
    pub restart_delay_ms: u64,

    /// Output fragment treated as a crash signature (repeatable; replaces the defaults)
    #[arg(long = "crash-pattern")]
    pub crash_patterns: Vec<String>,

    /// Append supervisor logs and child output to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Where to write the failure marker when the restart budget runs out
    #[arg(long, default_value = "restart-failure.json")]
    pub marker_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Command to supervise, followed by its arguments
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

impl Args {
    fn into_config(self) -> SupervisorResult<SupervisorConfig> {
        let mut command = self.command.into_iter();
        let program = command
            .next()
            .ok_or_else(|| SupervisorError::config("command is required"))?;

        let mut config = SupervisorConfig::new(program)
            .with_args(command)
            .with_auto_restart(!self.no_auto_restart)
            .with_max_restarts(self.max_restarts)
            .with_restart_delay(Duration::from_millis(self.restart_delay_ms))
            .with_log_file(self.log_file)
            .with_marker_file(self.marker_file);

        if !self.crash_patterns.is_empty() {
            config = config.with_crash_patterns(self.crash_patterns);
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> SupervisorResult<()> {
    // Child inherits the bot's environment
    dotenv::dotenv().ok();

    let args = Args::parse();

    ProcessRole::init_supervisor();

    let log_sink = args.log_file.as_deref().map(LogSink::open).transpose()?;
    logging::init_tracing_with_sink(Some(&args.log_level), log_sink.clone());

    let config = args.into_config()?;
    let reporter = Arc::new(MarkerFileReporter::new(config.marker_file.clone()));

    logging::log_startup(ProcessRole::current(), &format!("supervisor for '{}'", config.command_line()));

    let (mut supervisor, handle) = Supervisor::new(config, reporter)?;
    if let Some(sink) = log_sink {
        supervisor = supervisor.with_log_sink(sink);
    }

    tokio::spawn(forward_signals(handle));

    let exit = supervisor.run().await?;

    logging::log_success(ProcessRole::current(), &format!("Supervisor exited cleanly: {exit:?}"));
    Ok(())
}

/// SIGINT/SIGTERM shut down; SIGHUP restarts the child with a fresh budget
#[cfg(unix)]
async fn forward_signals(handle: SupervisorHandle) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut interrupt, mut terminate, mut hangup) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(interrupt), Ok(terminate), Ok(hangup)) => (interrupt, terminate, hangup),
        _ => {
            logging::log_error(ProcessRole::current(), "Signal handling", &"could not install handlers");
            return;
        }
    };

    loop {
        let result = tokio::select! {
            _ = interrupt.recv() => {
                logging::log_shutdown(ProcessRole::current(), "Received SIGINT");
                handle.shutdown("SIGINT")
            }
            _ = terminate.recv() => {
                logging::log_shutdown(ProcessRole::current(), "Received SIGTERM");
                handle.shutdown("SIGTERM")
            }
            _ = hangup.recv() => {
                process_debug!(ProcessRole::current(), "📨 SIGHUP received");
                handle.restart("operator restart (SIGHUP)")
            }
        };

        if result.is_err() {
            break;
        }
    }
}

#[cfg(not(unix))]
async fn forward_signals(handle: SupervisorHandle) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            logging::log_shutdown(ProcessRole::current(), "Received SIGINT");
            let _ = handle.shutdown("SIGINT");
        }
        Err(err) => logging::log_error(ProcessRole::current(), "Signal handling", &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_after_double_dash() {
        let args = Args::parse_from(["supervisor", "--max-restarts", "2", "--", "node", "index.js", "--shard", "1"]);
        let config = args.into_config().unwrap();

        assert_eq!(config.command, "node");
        assert_eq!(config.args, vec!["index.js", "--shard", "1"]);
        assert_eq!(config.max_restarts, 2);
        assert!(config.auto_restart);
    }

    #[test]
    fn test_crash_patterns_replace_defaults() {
        let args = Args::parse_from([
            "supervisor",
            "--no-auto-restart",
            "--crash-pattern",
            "PANIC",
            "--crash-pattern",
            "fatal",
            "--",
            "bot",
        ]);
        let config = args.into_config().unwrap();

        assert_eq!(config.crash_patterns, vec!["PANIC", "fatal"]);
        assert!(!config.auto_restart);
    }

    #[test]
    fn test_command_is_required() {
        assert!(Args::try_parse_from(["supervisor", "--max-restarts", "2"]).is_err());
    }
}
