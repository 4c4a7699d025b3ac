//! Outstanding request bookkeeping
//!
//! Every posted request owns one entry keyed by its correlation id. The
//! entry is removed exactly once: by the reply pump when the matching reply
//! arrives, or by the caller's `PendingReply` when it times out, is
//! cancelled or is dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::lock;
use crate::error::{PoolError, PoolResult};
use shared::{CorrelationId, WorkerId, WorkerReply};

pub(crate) struct PendingEntry {
    pub worker_id: WorkerId,
    pub sent_at: Instant,
    pub responder: oneshot::Sender<WorkerReply>,
}

#[derive(Clone, Default)]
pub(crate) struct PendingTable {
    entries: Arc<Mutex<HashMap<CorrelationId, PendingEntry>>>,
}

impl PendingTable {
    /// Register a new outstanding request and hand back its receiving half
    pub fn register(&self, worker_id: WorkerId) -> (CorrelationId, oneshot::Receiver<WorkerReply>) {
        let (responder, rx) = oneshot::channel();
        let mut entries = lock(&self.entries);

        // Unique among outstanding requests
        let mut id = CorrelationId::new();
        while entries.contains_key(&id) {
            id = CorrelationId::new();
        }

        entries.insert(
            id,
            PendingEntry {
                worker_id,
                sent_at: Instant::now(),
                responder,
            },
        );
        (id, rx)
    }

    pub fn take(&self, id: &CorrelationId) -> Option<PendingEntry> {
        lock(&self.entries).remove(id)
    }

    pub fn remove(&self, id: &CorrelationId) -> bool {
        self.take(id).is_some()
    }

    /// Drop every entry addressed to `worker_id`; their callers observe `WorkerGone`
    pub fn fail_worker(&self, worker_id: WorkerId) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, entry| entry.worker_id != worker_id);
        before - entries.len()
    }

    pub fn clear(&self) -> usize {
        let mut entries = lock(&self.entries);
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn outstanding_for(&self, worker_id: WorkerId) -> usize {
        lock(&self.entries)
            .values()
            .filter(|entry| entry.worker_id == worker_id)
            .count()
    }
}

/// Caller's handle on one in-flight request
///
/// Resolves to the single reply carrying this request's correlation id.
/// Dropping it abandons the request and frees the pending entry; a late
/// reply is then discarded by the pump.
pub struct PendingReply {
    id: CorrelationId,
    worker_id: WorkerId,
    rx: oneshot::Receiver<WorkerReply>,
    cancel: CancellationToken,
    table: PendingTable,
}

impl PendingReply {
    pub(crate) fn new(
        id: CorrelationId,
        worker_id: WorkerId,
        rx: oneshot::Receiver<WorkerReply>,
        table: PendingTable,
    ) -> Self {
        Self {
            id,
            worker_id,
            rx,
            cancel: CancellationToken::new(),
            table,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.id
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Token that abandons this request when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the matching reply, the timeout, or cancellation, whichever comes first
    pub async fn wait(mut self, timeout: Duration) -> PoolResult<WorkerReply> {
        let worker_id = self.worker_id;

        tokio::select! {
            biased;

            reply = &mut self.rx => reply.map_err(|_| PoolError::WorkerGone { worker_id }),
            _ = self.cancel.cancelled() => Err(PoolError::Cancelled { worker_id }),
            _ = tokio::time::sleep(timeout) => Err(PoolError::ReplyTimeout { worker_id, timeout }),
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

impl fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReply")
            .field("id", &self.id)
            .field("worker_id", &self.worker_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
