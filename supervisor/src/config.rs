//! Supervisor configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::core::signatures::DEFAULT_CRASH_PATTERNS;
use crate::error::{SupervisorError, SupervisorResult};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub command: String,
    pub args: Vec<String>,
    pub auto_restart: bool,
    pub max_restarts: u32,
    /// Delay before relaunching after an unexpected exit
    pub restart_delay: Duration,
    /// Delay between a fatal output line and the forced restart
    pub fatal_restart_delay: Duration,
    /// Pause between a restart's termination and the next launch
    pub settle_delay: Duration,
    pub restart_grace: Duration,
    pub shutdown_grace: Duration,
    /// Crash-free period after which the restart count starts over
    pub reset_window: Duration,
    pub crash_patterns: Vec<String>,
    pub log_file: Option<PathBuf>,
    pub marker_file: PathBuf,
}

impl SupervisorConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            auto_restart: true,
            max_restarts: 5,
            restart_delay: Duration::from_millis(3000),
            fatal_restart_delay: Duration::from_millis(1000),
            settle_delay: Duration::from_millis(1000),
            restart_grace: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
            reset_window: Duration::from_secs(60 * 60),
            crash_patterns: DEFAULT_CRASH_PATTERNS.iter().map(|p| p.to_string()).collect(),
            log_file: None,
            marker_file: PathBuf::from("restart-failure.json"),
        }
    }

    /// Configure child arguments (fluent API)
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auto_restart(mut self, auto_restart: bool) -> Self {
        self.auto_restart = auto_restart;
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn with_fatal_restart_delay(mut self, delay: Duration) -> Self {
        self.fatal_restart_delay = delay;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Configure both grace windows (fluent API)
    pub fn with_grace(mut self, restart_grace: Duration, shutdown_grace: Duration) -> Self {
        self.restart_grace = restart_grace;
        self.shutdown_grace = shutdown_grace;
        self
    }

    pub fn with_reset_window(mut self, reset_window: Duration) -> Self {
        self.reset_window = reset_window;
        self
    }

    /// Replace the crash signature list (fluent API)
    pub fn with_crash_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.crash_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    pub fn with_marker_file(mut self, marker_file: impl Into<PathBuf>) -> Self {
        self.marker_file = marker_file.into();
        self
    }

    /// Full command line as written to the failure marker
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn validate(&self) -> SupervisorResult<()> {
        if self.command.trim().is_empty() {
            return Err(SupervisorError::config("command must not be empty"));
        }
        if self.crash_patterns.iter().any(|p| p.is_empty()) {
            return Err(SupervisorError::config("crash patterns must not be empty strings"));
        }
        if self.marker_file.as_os_str().is_empty() {
            return Err(SupervisorError::config("marker_file must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SupervisorConfig::new("node");
        assert!(config.auto_restart);
        assert_eq!(config.max_restarts, 5);
        assert_eq!(config.restart_delay, Duration::from_millis(3000));
        assert_eq!(config.shutdown_grace, Duration::from_secs(10));
        assert_eq!(config.restart_grace, Duration::from_secs(5));
        assert_eq!(config.reset_window, Duration::from_secs(3600));
        assert_eq!(config.crash_patterns.len(), DEFAULT_CRASH_PATTERNS.len());
        assert_eq!(config.marker_file, PathBuf::from("restart-failure.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_command_line_joins_args() {
        let config = SupervisorConfig::new("node").with_args(["index.js", "--shard", "0"]);
        assert_eq!(config.command_line(), "node index.js --shard 0");
    }

    #[test]
    fn test_validate_rejects_empty_command_and_patterns() {
        assert!(SupervisorConfig::new("  ").validate().is_err());

        let config = SupervisorConfig::new("node").with_crash_patterns([""]);
        assert!(matches!(
            config.validate(),
            Err(SupervisorError::ConfigurationError { .. })
        ));
    }
}
