//! Worker pool manager
//!
//! Creates and reuses workers keyed by kind, correlates requests with
//! replies, tracks ping latency and reports per-kind statistics. The pool is
//! bounded per kind and evicts workers that stay idle too long.

pub mod pending;
pub mod worker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{PoolError, PoolResult};
use crate::registry::TaskRegistry;
use pending::PendingTable;
use shared::{
    process_debug, process_info, process_warn, KindStats, ProcessRole, WorkerEnvelope, WorkerId, WorkerKind,
    WorkerMessage, WorkerPoolStats,
};
use worker::WorkerSlot;

pub use pending::PendingReply;
pub use worker::WorkerState;

/// Lock a bookkeeping mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_workers_per_kind: usize,
    pub idle_timeout: Duration,
    pub health_interval: Duration,
    pub reply_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers_per_kind: 4,
            idle_timeout: Duration::from_secs(300),
            health_interval: Duration::from_secs(30),
            reply_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Configure the per-kind worker cap (fluent API)
    pub fn with_max_workers_per_kind(mut self, max: usize) -> Self {
        self.max_workers_per_kind = max;
        self
    }

    /// Configure idle eviction (fluent API)
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Configure the health sweep period (fluent API)
    pub fn with_health_interval(mut self, health_interval: Duration) -> Self {
        self.health_interval = health_interval;
        self
    }

    /// Configure how long callers wait for a reply (fluent API)
    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.max_workers_per_kind == 0 {
            return Err(PoolError::config("max_workers_per_kind must be at least 1"));
        }
        if self.health_interval.is_zero() {
            return Err(PoolError::config("health_interval must be non-zero"));
        }
        if self.reply_timeout.is_zero() {
            return Err(PoolError::config("reply_timeout must be non-zero"));
        }
        Ok(())
    }
}

/// Caller-visible view of a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDescriptor {
    pub id: WorkerId,
    pub kind: WorkerKind,
    pub state: WorkerState,
}

impl From<&WorkerSlot> for WorkerDescriptor {
    fn from(slot: &WorkerSlot) -> Self {
        Self {
            id: slot.id,
            kind: slot.kind.clone(),
            state: slot.state(),
        }
    }
}

pub(crate) struct PoolInner {
    registry: TaskRegistry,
    config: PoolConfig,
    workers: Mutex<HashMap<WorkerId, WorkerSlot>>,
    pending: PendingTable,
    next_worker_id: AtomicU64,
}

impl PoolInner {
    pub(crate) fn record_ping(&self, worker_id: WorkerId, round_trip: Duration) {
        if let Some(slot) = lock(&self.workers).get_mut(&worker_id) {
            slot.telemetry.record(round_trip);
        }
    }

    pub(crate) fn forget_worker(&self, worker_id: WorkerId) {
        lock(&self.workers).remove(&worker_id);
    }

    fn release(&self, worker_id: WorkerId) {
        if let Some(slot) = lock(&self.workers).get_mut(&worker_id) {
            slot.leases = slot.leases.saturating_sub(1);
            slot.touch();
        }
    }
}

/// Pool of in-process workers grouped by kind
///
/// Cheap to clone; all clones share the same workers. Dropping the last
/// clone closes every worker inbox.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    pub fn new(registry: TaskRegistry, config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                registry,
                config,
                workers: Mutex::new(HashMap::new()),
                pending: PendingTable::default(),
                next_worker_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// An idle worker of `kind`, if one exists
    pub fn get_available_worker(&self, kind: &WorkerKind) -> Option<WorkerDescriptor> {
        let workers = lock(&self.inner.workers);
        workers
            .values()
            .filter(|slot| &slot.kind == kind && slot.state() == WorkerState::Idle)
            .min_by_key(|slot| slot.id)
            .map(WorkerDescriptor::from)
    }

    /// Start a new worker bound to the protocol registered for `kind`
    ///
    /// Must be called from within a tokio runtime.
    pub fn create_worker(&self, kind: &WorkerKind) -> PoolResult<WorkerDescriptor> {
        let mut workers = lock(&self.inner.workers);
        let id = self.create_worker_locked(&mut workers, kind)?;
        Ok(WorkerDescriptor::from(&workers[&id]))
    }

    fn create_worker_locked(
        &self,
        workers: &mut HashMap<WorkerId, WorkerSlot>,
        kind: &WorkerKind,
    ) -> PoolResult<WorkerId> {
        let factory = self
            .inner
            .registry
            .factory(kind)
            .ok_or_else(|| PoolError::UnknownKind { kind: kind.clone() })?;

        let id = WorkerId::new(self.inner.next_worker_id.fetch_add(1, Ordering::Relaxed));
        let slot = worker::spawn_worker(
            id,
            kind.clone(),
            factory(),
            Arc::downgrade(&self.inner),
            self.inner.pending.clone(),
        );
        workers.insert(id, slot);

        process_debug!(ProcessRole::current(), "🏭 Created {} for '{}'", id, kind);
        Ok(id)
    }

    /// Lease a worker of `kind`: an idle one, a new one while under the cap,
    /// otherwise the least-loaded one. The worker is Busy while leased.
    pub fn acquire(&self, kind: &WorkerKind) -> PoolResult<WorkerLease> {
        let mut workers = lock(&self.inner.workers);

        let of_kind = workers.values().filter(|slot| &slot.kind == kind).count();
        let least_loaded = workers
            .values()
            .filter(|slot| &slot.kind == kind)
            .min_by_key(|slot| (slot.leases, slot.id))
            .map(|slot| (slot.id, slot.leases));

        let worker_id = match least_loaded {
            Some((id, 0)) => id,
            _ if of_kind < self.inner.config.max_workers_per_kind => self.create_worker_locked(&mut workers, kind)?,
            Some((id, _)) => id,
            None => return Err(PoolError::UnknownKind { kind: kind.clone() }),
        };

        let slot = workers
            .get_mut(&worker_id)
            .ok_or(PoolError::UnknownWorker { worker_id })?;
        slot.leases += 1;
        slot.touch();

        Ok(WorkerLease {
            pool: self.clone(),
            descriptor: WorkerDescriptor::from(&*slot),
        })
    }

    /// Post a task payload to a worker; the reply is matched by correlation id
    pub fn post_message(&self, worker_id: WorkerId, payload: serde_json::Value) -> PoolResult<PendingReply> {
        self.post(worker_id, WorkerMessage::Task(payload))
    }

    /// Post a liveness probe; its round trip feeds the worker's latency telemetry
    pub fn post_ping(&self, worker_id: WorkerId) -> PoolResult<PendingReply> {
        self.post(worker_id, WorkerMessage::Ping)
    }

    fn post(&self, worker_id: WorkerId, message: WorkerMessage) -> PoolResult<PendingReply> {
        let inbox = {
            let mut workers = lock(&self.inner.workers);
            let slot = workers
                .get_mut(&worker_id)
                .ok_or(PoolError::UnknownWorker { worker_id })?;
            // Probes do not count as use
            if matches!(message, WorkerMessage::Task(_)) {
                slot.touch();
            }
            slot.inbox.clone()
        };

        let (id, rx) = self.inner.pending.register(worker_id);
        let pending = PendingReply::new(id, worker_id, rx, self.inner.pending.clone());

        inbox
            .send(WorkerEnvelope { id, data: message })
            .map_err(|_| PoolError::WorkerGone { worker_id })?;

        Ok(pending)
    }

    /// Ping one worker and return the measured round trip
    pub async fn ping(&self, worker_id: WorkerId) -> PoolResult<Duration> {
        let started = Instant::now();
        self.post_ping(worker_id)?
            .wait(self.inner.config.reply_timeout)
            .await?;
        Ok(started.elapsed())
    }

    /// Ping every live worker concurrently
    pub async fn ping_all(&self) -> Vec<(WorkerId, PoolResult<Duration>)> {
        let timeout = self.inner.config.reply_timeout;
        let mut probes = JoinSet::new();

        for worker_id in self.worker_ids() {
            let started = Instant::now();
            match self.post_ping(worker_id) {
                Ok(pending) => {
                    probes.spawn(async move {
                        let result = pending.wait(timeout).await.map(|_| started.elapsed());
                        (worker_id, result)
                    });
                }
                Err(e) => {
                    probes.spawn(async move { (worker_id, Err(e)) });
                }
            }
        }

        let mut results = Vec::new();
        while let Some(joined) = probes.join_next().await {
            if let Ok(result) = joined {
                results.push(result);
            }
        }
        results.sort_by_key(|(id, _)| *id);
        results
    }

    /// Snapshot of the live worker set, aggregated by kind
    pub fn worker_stats(&self) -> WorkerPoolStats {
        let workers = lock(&self.inner.workers);
        let mut stats = WorkerPoolStats {
            total: workers.len(),
            ..WorkerPoolStats::default()
        };

        let mut by_kind: HashMap<&WorkerKind, Vec<&WorkerSlot>> = HashMap::new();
        for slot in workers.values() {
            by_kind.entry(&slot.kind).or_default().push(slot);
        }

        for (kind, slots) in by_kind {
            let averages: Vec<f64> = slots.iter().filter_map(|slot| slot.telemetry.avg_ping_ms).collect();
            let latest = slots
                .iter()
                .filter_map(|slot| Some((slot.telemetry.last_ping_at?, slot.telemetry.last_ping_ms?)))
                .max_by_key(|(at, _)| *at)
                .map(|(_, ms)| ms);

            stats.by_type.insert(
                kind.to_string(),
                KindStats {
                    available: slots.iter().filter(|slot| slot.state() == WorkerState::Idle).count(),
                    running: slots.iter().filter(|slot| slot.state() == WorkerState::Busy).count(),
                    avg_ping_ms: (!averages.is_empty()).then(|| averages.iter().sum::<f64>() / averages.len() as f64),
                    last_ping_ms: latest,
                },
            );
        }

        stats
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<_> = lock(&self.inner.workers).keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn worker_count(&self) -> usize {
        lock(&self.inner.workers).len()
    }

    pub fn outstanding_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Stop workers that have been idle, with nothing in flight, for at least `idle_timeout`
    pub fn evict_idle(&self, idle_timeout: Duration) -> Vec<WorkerId> {
        let mut workers = lock(&self.inner.workers);

        let evicted: Vec<WorkerId> = workers
            .values()
            .filter(|slot| {
                slot.state() == WorkerState::Idle
                    && slot.last_used.elapsed() >= idle_timeout
                    && self.inner.pending.outstanding_for(slot.id) == 0
            })
            .map(|slot| slot.id)
            .collect();

        for id in &evicted {
            // Dropping the inbox sender ends the worker loop
            workers.remove(id);
        }

        if !evicted.is_empty() {
            process_debug!(ProcessRole::current(), "🧹 Evicted {} idle workers", evicted.len());
        }
        evicted
    }

    /// Periodically ping every worker and evict idle ones until `cancel` fires
    pub fn spawn_health_monitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let pool = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.inner.config.health_interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        for (worker_id, result) in pool.ping_all().await {
                            if let Err(e) = result {
                                process_warn!(ProcessRole::current(), "🩺 Health check failed for {}: {}", worker_id, e);
                            }
                        }
                        pool.evict_idle(pool.inner.config.idle_timeout);
                    }
                }
            }

            process_debug!(ProcessRole::current(), "🩺 Health monitor stopped");
        })
    }

    /// Stop every worker; outstanding callers observe `WorkerGone`
    pub fn shutdown(&self) {
        let stopped = {
            let mut workers = lock(&self.inner.workers);
            let count = workers.len();
            workers.clear();
            count
        };
        let abandoned = self.inner.pending.clear();

        process_info!(
            ProcessRole::current(),
            "🛑 Worker pool stopped {} workers ({} requests abandoned)",
            stopped,
            abandoned
        );
    }
}

/// A worker held Busy for the lifetime of the lease
pub struct WorkerLease {
    pool: WorkerPool,
    descriptor: WorkerDescriptor,
}

impl WorkerLease {
    pub fn worker_id(&self) -> WorkerId {
        self.descriptor.id
    }

    pub fn kind(&self) -> &WorkerKind {
        &self.descriptor.kind
    }

    pub fn post(&self, payload: serde_json::Value) -> PoolResult<PendingReply> {
        self.pool.post_message(self.descriptor.id, payload)
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        self.pool.inner.release(self.descriptor.id);
    }
}

impl std::fmt::Debug for WorkerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLease").field("worker", &self.descriptor).finish()
    }
}
