//! Read-only worker pool snapshot for operational dashboards

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `{total, byType}` aggregate, computed on demand from the live worker set
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPoolStats {
    pub total: usize,
    pub by_type: BTreeMap<String, KindStats>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KindStats {
    /// Idle workers of this kind
    pub available: usize,
    /// Busy workers of this kind
    pub running: usize,
    pub avg_ping_ms: Option<f64>,
    pub last_ping_ms: Option<f64>,
}

impl WorkerPoolStats {
    pub fn kind(&self, kind: &str) -> Option<&KindStats> {
        self.by_type.get(kind)
    }
}
