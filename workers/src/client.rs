//! Typed request/reply API over the worker pool
//!
//! Callers never see workers, envelopes or correlation ids: every call
//! leases a worker of the right kind, posts one request and awaits its
//! single reply.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{PoolError, PoolResult};
use crate::pool::WorkerPool;
use shared::messages::{decode_payload, encode_payload};
use shared::{
    BatchOutcome, CountdownEntry, RateLimitRequest, ReplyBody, TranslateReply, TranslateRequest, WorkerId,
    WorkerKind, WorkerPoolStats, WorkerReply,
};

#[derive(Clone)]
pub struct WorkerClient {
    pool: Arc<WorkerPool>,
    reply_timeout: Duration,
}

impl WorkerClient {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        let reply_timeout = pool.config().reply_timeout;
        Self { pool, reply_timeout }
    }

    /// Override how long each call waits for its reply (fluent API)
    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub async fn translate(&self, text: &str, from: &str, to: &str) -> PoolResult<String> {
        self.translate_with_cancel(text, from, to, &CancellationToken::new()).await
    }

    /// Translate, giving up with `PoolError::Cancelled` as soon as `cancel` fires
    pub async fn translate_with_cancel(
        &self,
        text: &str,
        from: &str,
        to: &str,
        cancel: &CancellationToken,
    ) -> PoolResult<String> {
        let request = TranslateRequest {
            text: text.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        };

        let reply: TranslateReply = self.call(WorkerKind::TRANSLATE, &request, cancel).await?;
        Ok(reply.translation)
    }

    pub async fn process_rate_limits(
        &self,
        users: Vec<CountdownEntry>,
        limits: Vec<CountdownEntry>,
        decrement: i64,
    ) -> PoolResult<BatchOutcome> {
        let request = RateLimitRequest::Process { users, limits, decrement };
        self.call(WorkerKind::RATE_LIMIT, &request, &CancellationToken::new())
            .await
    }

    /// Untyped request to any registered kind
    pub async fn request(&self, kind: WorkerKind, payload: serde_json::Value) -> PoolResult<serde_json::Value> {
        self.request_with_cancel(kind, payload, &CancellationToken::new())
            .await
    }

    pub async fn request_with_cancel(
        &self,
        kind: WorkerKind,
        payload: serde_json::Value,
        cancel: &CancellationToken,
    ) -> PoolResult<serde_json::Value> {
        let lease = self.pool.acquire(&kind)?;
        let pending = lease.post(payload)?;
        let worker_id = pending.worker_id();

        let reply = tokio::select! {
            reply = pending.wait(self.reply_timeout) => reply?,
            _ = cancel.cancelled() => return Err(PoolError::Cancelled { worker_id }),
        };
        drop(lease);

        unwrap_reply(&kind, worker_id, reply)
    }

    pub fn stats(&self) -> WorkerPoolStats {
        self.pool.worker_stats()
    }

    /// Ping every worker; returns how many answered
    pub async fn ping_all(&self) -> usize {
        self.pool
            .ping_all()
            .await
            .into_iter()
            .filter(|(_, result)| result.is_ok())
            .count()
    }

    async fn call<Req, Resp>(&self, kind: WorkerKind, request: &Req, cancel: &CancellationToken) -> PoolResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = encode_payload(request)?;
        let value = self.request_with_cancel(kind, payload, cancel).await?;
        Ok(decode_payload(value)?)
    }
}

fn unwrap_reply(kind: &WorkerKind, worker_id: WorkerId, reply: WorkerReply) -> PoolResult<serde_json::Value> {
    match reply.body {
        ReplyBody::Data(value) => Ok(value),
        ReplyBody::Error { error } => Err(PoolError::Task {
            kind: kind.clone(),
            message: error,
        }),
        ReplyBody::Pong { .. } => Err(PoolError::UnexpectedReply {
            worker_id,
            message: format!("pong in answer to a {kind} task"),
        }),
    }
}
