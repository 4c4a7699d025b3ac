//! Failure marker written when the restart budget runs out

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SupervisorError, SupervisorResult};
use crate::traits::FailureReporter;
use shared::{process_info, ProcessRole};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub timestamp: DateTime<Utc>,
    pub restart_count: u32,
    pub max_restarts: u32,
    pub last_crash_time: Option<DateTime<Utc>>,
    pub reason: String,
    pub command: String,
    pub recent_output: Vec<String>,
}

/// Writes the report as pretty JSON, atomically (temp file + rename)
#[derive(Debug, Clone)]
pub struct MarkerFileReporter {
    path: PathBuf,
}

impl MarkerFileReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_error(&self, e: impl std::fmt::Display) -> SupervisorError {
        SupervisorError::MarkerWriteFailed {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl FailureReporter for MarkerFileReporter {
    async fn report(&self, report: FailureReport) -> SupervisorResult<()> {
        let body = serde_json::to_vec_pretty(&report)?;
        let temp = self.temp_path();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.write_error(e))?;
        }

        tokio::fs::write(&temp, &body)
            .await
            .map_err(|e| self.write_error(e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.write_error(e))?;

        process_info!(ProcessRole::current(), "📝 Failure marker written to {}", self.path.display());
        Ok(())
    }
}
