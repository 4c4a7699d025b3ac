//! Worker execution unit and its pool-side slot

use std::collections::VecDeque;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::pending::PendingTable;
use super::PoolInner;
use crate::traits::TaskProtocol;
use shared::{
    process_debug, process_warn, CorrelationId, ProcessRole, ReplyBody, WorkerEnvelope, WorkerId, WorkerKind,
    WorkerMessage, WorkerReply,
};

/// Weight of the newest sample in the rolling ping average
const PING_EMA_ALPHA: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Idle,
    Busy,
}

/// Rolling latency telemetry for one worker
#[derive(Debug, Clone, Default)]
pub(crate) struct PingTelemetry {
    pub avg_ping_ms: Option<f64>,
    pub last_ping_ms: Option<f64>,
    pub last_ping_at: Option<Instant>,
}

impl PingTelemetry {
    pub fn record(&mut self, round_trip: Duration) {
        let sample = round_trip.as_secs_f64() * 1000.0;
        self.avg_ping_ms = Some(match self.avg_ping_ms {
            Some(avg) => avg + PING_EMA_ALPHA * (sample - avg),
            None => sample,
        });
        self.last_ping_ms = Some(sample);
        self.last_ping_at = Some(Instant::now());
    }
}

/// Pool-side record of a live worker
pub(crate) struct WorkerSlot {
    pub id: WorkerId,
    pub kind: WorkerKind,
    pub inbox: mpsc::UnboundedSender<WorkerEnvelope>,
    pub leases: usize,
    pub last_used: Instant,
    pub telemetry: PingTelemetry,
}

impl WorkerSlot {
    pub fn state(&self) -> WorkerState {
        if self.leases > 0 {
            WorkerState::Busy
        } else {
            WorkerState::Idle
        }
    }

    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }
}

/// Spawn the worker task and its reply pump, returning the pool-side slot
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn_worker(
    id: WorkerId,
    kind: WorkerKind,
    protocol: Box<dyn TaskProtocol>,
    pool: Weak<PoolInner>,
    pending: PendingTable,
) -> WorkerSlot {
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();

    tokio::spawn(run_worker(id, protocol, inbox_rx, reply_tx));
    tokio::spawn(pump_replies(id, pool, pending, reply_rx));

    WorkerSlot {
        id,
        kind,
        inbox: inbox_tx,
        leases: 0,
        last_used: Instant::now(),
        telemetry: PingTelemetry::default(),
    }
}

/// Worker loop: run tasks strictly in arrival order until the inbox closes
///
/// Pings are answered as soon as they arrive, even while a task is running;
/// tasks that arrive meanwhile wait in `queued`.
async fn run_worker(
    id: WorkerId,
    mut protocol: Box<dyn TaskProtocol>,
    mut inbox: mpsc::UnboundedReceiver<WorkerEnvelope>,
    replies: mpsc::UnboundedSender<WorkerReply>,
) {
    process_debug!(ProcessRole::current(), "👷 {} ({}) started", id, protocol.kind());

    let mut queued: VecDeque<(CorrelationId, serde_json::Value)> = VecDeque::new();
    let mut inbox_open = true;

    loop {
        let (correlation_id, payload) = match queued.pop_front() {
            Some(task) => task,
            None if !inbox_open => break,
            None => match inbox.recv().await {
                Some(WorkerEnvelope {
                    id: ping_id,
                    data: WorkerMessage::Ping,
                }) => {
                    if replies.send(WorkerReply::pong(ping_id)).is_err() {
                        break;
                    }
                    continue;
                }
                Some(WorkerEnvelope {
                    id: task_id,
                    data: WorkerMessage::Task(payload),
                }) => (task_id, payload),
                None => break,
            },
        };

        let outcome = {
            let task = protocol.handle(payload);
            tokio::pin!(task);

            loop {
                tokio::select! {
                    biased;
                    outcome = &mut task => break outcome,
                    envelope = inbox.recv(), if inbox_open => match envelope {
                        Some(WorkerEnvelope { id: ping_id, data: WorkerMessage::Ping }) => {
                            let _ = replies.send(WorkerReply::pong(ping_id));
                        }
                        Some(WorkerEnvelope { id: task_id, data: WorkerMessage::Task(payload) }) => {
                            queued.push_back((task_id, payload));
                        }
                        None => inbox_open = false,
                    },
                }
            }
        };

        let reply = match outcome {
            Ok(value) => WorkerReply::data(correlation_id, value),
            Err(e) => {
                process_debug!(ProcessRole::current(), "⚠️ {} task {} failed: {}", id, correlation_id, e);
                WorkerReply::error(correlation_id, e.to_string())
            }
        };

        if replies.send(reply).is_err() {
            break;
        }
    }

    process_debug!(ProcessRole::current(), "👋 {} stopped", id);
}

/// Single inbound observer per worker: route each reply to its waiting caller
async fn pump_replies(
    worker_id: WorkerId,
    pool: Weak<PoolInner>,
    pending: PendingTable,
    mut replies: mpsc::UnboundedReceiver<WorkerReply>,
) {
    while let Some(reply) = replies.recv().await {
        let Some(entry) = pending.take(&reply.id) else {
            process_debug!(
                ProcessRole::current(),
                "📭 Dropping reply {} from {}: no caller waiting",
                reply.id,
                worker_id
            );
            continue;
        };

        if matches!(reply.body, ReplyBody::Pong { .. }) {
            if let Some(pool) = pool.upgrade() {
                pool.record_ping(worker_id, entry.sent_at.elapsed());
            }
        }

        // The caller may have given up between take() and send()
        let _ = entry.responder.send(reply);
    }

    let failed = pending.fail_worker(worker_id);
    if failed > 0 {
        process_warn!(
            ProcessRole::current(),
            "💥 {} exited with {} requests outstanding",
            worker_id,
            failed
        );
    }
    if let Some(pool) = pool.upgrade() {
        pool.forget_worker(worker_id);
    }
}
