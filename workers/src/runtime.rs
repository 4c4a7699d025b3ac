//! Owned worker-layer context built once at startup
//!
//! Handed to command handlers instead of process-wide globals.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::WorkerClient;
use crate::error::PoolResult;
use crate::pool::{PoolConfig, WorkerPool};
use crate::registry::TaskRegistry;
use shared::{process_info, ProcessRole};

pub struct WorkerRuntime {
    pool: Arc<WorkerPool>,
    client: WorkerClient,
    monitor_cancel: CancellationToken,
    monitor: Option<JoinHandle<()>>,
}

impl WorkerRuntime {
    /// Build the pool and start its health monitor
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(registry: TaskRegistry, config: PoolConfig) -> PoolResult<Self> {
        let pool = Arc::new(WorkerPool::new(registry, config)?);
        let client = WorkerClient::new(pool.clone());
        let monitor_cancel = CancellationToken::new();
        let monitor = pool.spawn_health_monitor(monitor_cancel.clone());

        process_info!(
            ProcessRole::current(),
            "⚙️ Worker runtime started (max {} workers per kind)",
            pool.config().max_workers_per_kind
        );

        Ok(Self {
            pool,
            client,
            monitor_cancel,
            monitor: Some(monitor),
        })
    }

    pub fn client(&self) -> &WorkerClient {
        &self.client
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Stop the health monitor and drain the pool
    pub async fn shutdown(mut self) {
        self.monitor_cancel.cancel();
        if let Some(monitor) = self.monitor.take() {
            let _ = monitor.await;
        }
        self.pool.shutdown();
    }
}

impl Drop for WorkerRuntime {
    fn drop(&mut self) {
        self.monitor_cancel.cancel();
    }
}
