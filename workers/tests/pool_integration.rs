//! Integration tests for the worker pool and the typed client
//!
//! Workers run small in-test protocols so every pool behaviour can be
//! observed without touching the network.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use shared::{CountdownEntry, ReplyBody, WorkerId, WorkerKind};
use workers::traits::MockTranslator;
use workers::{
    PoolConfig, PoolError, TaskProtocol, TaskRegistry, TranslateConfig, WorkerClient, WorkerError, WorkerPool,
    WorkerResult, WorkerState,
};

const ECHO: WorkerKind = WorkerKind::from_static("echo");
const SLEEPY: WorkerKind = WorkerKind::from_static("sleepy");

/// Replies with its payload; `{"fail": true}` is rejected
struct EchoProtocol;

#[async_trait]
impl TaskProtocol for EchoProtocol {
    fn kind(&self) -> WorkerKind {
        ECHO
    }

    async fn handle(&mut self, payload: Value) -> WorkerResult<Value> {
        if payload.get("fail").and_then(Value::as_bool) == Some(true) {
            return Err(WorkerError::InvalidPayload {
                message: "asked to fail".to_string(),
            });
        }
        Ok(payload)
    }
}

/// Never finishes a task within a test's lifetime
struct SleepyProtocol;

#[async_trait]
impl TaskProtocol for SleepyProtocol {
    fn kind(&self) -> WorkerKind {
        SLEEPY
    }

    async fn handle(&mut self, payload: Value) -> WorkerResult<Value> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(payload)
    }
}

fn test_registry() -> TaskRegistry {
    TaskRegistry::new()
        .register(ECHO, || Box::new(EchoProtocol))
        .register(SLEEPY, || Box::new(SleepyProtocol))
}

fn test_pool(config: PoolConfig) -> Arc<WorkerPool> {
    Arc::new(WorkerPool::new(test_registry(), config).unwrap())
}

#[tokio::test]
async fn test_stats_report_leased_workers_as_running() {
    // Arrange
    let pool = test_pool(PoolConfig::default());
    for _ in 0..3 {
        pool.create_worker(&ECHO).unwrap();
    }

    // Act
    let first = pool.acquire(&ECHO).unwrap();
    let second = pool.acquire(&ECHO).unwrap();
    let stats = pool.worker_stats();

    // Assert
    assert_ne!(first.worker_id(), second.worker_id());
    assert_eq!(stats.total, 3);
    let echo = stats.kind("echo").unwrap();
    assert_eq!(echo.available, 1);
    assert_eq!(echo.running, 2);

    drop(first);
    drop(second);
    assert_eq!(pool.worker_stats().kind("echo").unwrap().available, 3);
}

#[tokio::test]
async fn test_available_worker_is_idle_and_of_requested_kind() {
    let pool = test_pool(PoolConfig::default());
    assert!(pool.get_available_worker(&ECHO).is_none());

    let created = pool.create_worker(&ECHO).unwrap();
    pool.create_worker(&SLEEPY).unwrap();

    let available = pool.get_available_worker(&ECHO).unwrap();
    assert_eq!(available.id, created.id);
    assert_eq!(available.state, WorkerState::Idle);

    let _lease = pool.acquire(&ECHO).unwrap();
    assert!(pool.get_available_worker(&ECHO).is_none());
}

#[tokio::test]
async fn test_concurrent_requests_each_get_their_own_reply() {
    // Arrange
    let pool = test_pool(PoolConfig::default());
    let worker = pool.create_worker(&ECHO).unwrap();

    // Act
    let pending: Vec<_> = (0..20)
        .map(|n| pool.post_message(worker.id, json!({ "n": n })).unwrap())
        .collect();
    let replies = futures_join(pending).await;

    // Assert
    for (n, reply) in replies.into_iter().enumerate() {
        match reply.body {
            ReplyBody::Data(value) => assert_eq!(value, json!({ "n": n })),
            other => panic!("unexpected reply body: {other:?}"),
        }
    }
    assert_eq!(pool.outstanding_requests(), 0);
}

async fn futures_join(pending: Vec<workers::PendingReply>) -> Vec<shared::WorkerReply> {
    let mut handles = Vec::new();
    for reply in pending {
        handles.push(tokio::spawn(reply.wait(Duration::from_secs(5))));
    }

    let mut replies = Vec::new();
    for handle in handles {
        replies.push(handle.await.unwrap().unwrap());
    }
    replies
}

#[tokio::test]
async fn test_cancelled_request_frees_pending_entry() {
    let pool = test_pool(PoolConfig::default());
    let worker = pool.create_worker(&SLEEPY).unwrap();

    let pending = pool.post_message(worker.id, json!({})).unwrap();
    assert_eq!(pool.outstanding_requests(), 1);
    pending.cancel();

    let err = pending.wait(Duration::from_secs(30)).await.unwrap_err();
    assert!(matches!(err, PoolError::Cancelled { .. }));
    assert_eq!(pool.outstanding_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_request_frees_pending_entry() {
    let pool = test_pool(PoolConfig::default());
    let worker = pool.create_worker(&SLEEPY).unwrap();

    let err = pool
        .post_message(worker.id, json!({}))
        .unwrap()
        .wait(Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(err, PoolError::ReplyTimeout { .. }));
    assert_eq!(pool.outstanding_requests(), 0);
}

#[tokio::test]
async fn test_client_cancellation_token_abandons_request() {
    let pool = test_pool(PoolConfig::default());
    let client = WorkerClient::new(pool.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .request_with_cancel(SLEEPY, json!({}), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, PoolError::Cancelled { .. }));
    assert_eq!(pool.outstanding_requests(), 0);
    assert_eq!(pool.worker_stats().kind("sleepy").unwrap().running, 0);
}

#[tokio::test(start_paused = true)]
async fn test_evict_idle_keeps_busy_workers() {
    // Arrange
    let pool = test_pool(PoolConfig::default());
    let leased = pool.create_worker(&ECHO).unwrap();
    let lease = pool.acquire(&ECHO).unwrap();
    let spare = pool.create_worker(&ECHO).unwrap();
    assert_eq!(lease.worker_id(), leased.id);

    // Act
    tokio::time::advance(Duration::from_secs(301)).await;
    let evicted = pool.evict_idle(Duration::from_secs(300));

    // Assert
    assert_eq!(evicted, vec![spare.id]);
    assert_eq!(pool.worker_ids(), vec![leased.id]);
}

#[tokio::test(start_paused = true)]
async fn test_recently_used_workers_survive_eviction() {
    let pool = test_pool(PoolConfig::default());
    let worker = pool.create_worker(&ECHO).unwrap();

    tokio::time::advance(Duration::from_secs(200)).await;
    pool.post_message(worker.id, json!({}))
        .unwrap()
        .wait(Duration::from_secs(1))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(200)).await;

    assert!(pool.evict_idle(Duration::from_secs(300)).is_empty());
    assert_eq!(pool.worker_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_health_monitor_pings_and_evicts() {
    let config = PoolConfig::default()
        .with_health_interval(Duration::from_secs(30))
        .with_idle_timeout(Duration::from_secs(60));
    let pool = test_pool(config);
    pool.create_worker(&ECHO).unwrap();

    let cancel = CancellationToken::new();
    let monitor = pool.spawn_health_monitor(cancel.clone());
    tokio::time::sleep(Duration::from_secs(100)).await;

    assert_eq!(pool.worker_count(), 0);
    cancel.cancel();
    monitor.await.unwrap();
}

#[tokio::test]
async fn test_acquire_never_exceeds_kind_bound() {
    let pool = test_pool(PoolConfig::default().with_max_workers_per_kind(2));

    let leases: Vec<_> = (0..5).map(|_| pool.acquire(&ECHO).unwrap()).collect();

    assert_eq!(pool.worker_count(), 2);
    let stats = pool.worker_stats();
    assert_eq!(stats.kind("echo").unwrap().running, 2);
    assert_eq!(leases.len(), 5);
}

#[tokio::test]
async fn test_task_failure_reaches_only_its_caller() {
    // Arrange
    let pool = test_pool(PoolConfig::default().with_max_workers_per_kind(1));
    let client = WorkerClient::new(pool.clone());

    // Act
    let failed = client.request(ECHO, json!({ "fail": true })).await;
    let succeeded = client.request(ECHO, json!({ "ok": 1 })).await;

    // Assert
    let err = failed.unwrap_err();
    assert!(matches!(err, PoolError::Task { ref message, .. } if message.contains("asked to fail")));
    assert_eq!(succeeded.unwrap(), json!({ "ok": 1 }));
    assert_eq!(pool.worker_count(), 1);
}

#[tokio::test]
async fn test_unknown_kind_and_worker_are_rejected() {
    let pool = test_pool(PoolConfig::default());

    let err = pool.acquire(&WorkerKind::new("music")).unwrap_err();
    assert!(matches!(err, PoolError::UnknownKind { .. }));

    let err = pool.post_message(WorkerId::new(999), json!({})).unwrap_err();
    assert!(matches!(err, PoolError::UnknownWorker { .. }));
}

#[tokio::test]
async fn test_ping_updates_latency_telemetry() {
    let pool = test_pool(PoolConfig::default());
    let worker = pool.create_worker(&ECHO).unwrap();
    assert_eq!(pool.worker_stats().kind("echo").unwrap().avg_ping_ms, None);

    pool.ping(worker.id).await.unwrap();
    let results = pool.ping_all().await;

    assert_eq!(results.len(), 1);
    assert!(results[0].1.is_ok());
    let echo = pool.worker_stats().kind("echo").cloned().unwrap();
    assert!(echo.avg_ping_ms.is_some());
    assert!(echo.last_ping_ms.is_some());
}

#[tokio::test]
async fn test_ping_is_answered_while_a_task_runs() {
    let pool = test_pool(PoolConfig::default());
    let worker = pool.create_worker(&SLEEPY).unwrap();
    let _in_flight = pool.post_message(worker.id, json!({})).unwrap();

    let reply = pool
        .post_ping(worker.id)
        .unwrap()
        .wait(Duration::from_millis(500))
        .await
        .unwrap();

    assert!(matches!(reply.body, ReplyBody::Pong { .. }));
    assert_eq!(pool.outstanding_requests(), 1);
}

/// Sleeps for `delay_ms`, then records `n` in completion order
struct OrderedProtocol {
    completed: Arc<std::sync::Mutex<Vec<u64>>>,
}

#[async_trait]
impl TaskProtocol for OrderedProtocol {
    fn kind(&self) -> WorkerKind {
        WorkerKind::from_static("ordered")
    }

    async fn handle(&mut self, payload: Value) -> WorkerResult<Value> {
        let delay = payload["delay_ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        if let Some(n) = payload["n"].as_u64() {
            self.completed.lock().unwrap().push(n);
        }
        Ok(payload)
    }
}

#[tokio::test]
async fn test_tasks_behind_a_ping_keep_arrival_order() {
    let ordered = WorkerKind::from_static("ordered");
    let completed = Arc::new(std::sync::Mutex::new(Vec::new()));
    let log = completed.clone();
    let registry = TaskRegistry::new().register(ordered.clone(), move || {
        Box::new(OrderedProtocol { completed: log.clone() })
    });
    let pool = WorkerPool::new(registry, PoolConfig::default()).unwrap();
    let worker = pool.create_worker(&ordered).unwrap();

    let slow = pool.post_message(worker.id, json!({ "n": 1, "delay_ms": 1000 })).unwrap();
    let ping = pool.post_ping(worker.id).unwrap();
    let fast = pool.post_message(worker.id, json!({ "n": 2, "delay_ms": 0 })).unwrap();

    let pong = ping.wait(Duration::from_millis(500)).await.unwrap();
    assert!(matches!(pong.body, ReplyBody::Pong { .. }));

    fast.wait(Duration::from_secs(5)).await.unwrap();
    slow.wait(Duration::from_secs(5)).await.unwrap();
    assert_eq!(*completed.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_shutdown_fails_in_flight_requests() {
    let pool = test_pool(PoolConfig::default());
    let worker = pool.create_worker(&SLEEPY).unwrap();
    let pending = pool.post_message(worker.id, json!({})).unwrap();

    pool.shutdown();

    let err = pending.wait(Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, PoolError::WorkerGone { .. }));
    assert_eq!(pool.worker_count(), 0);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let result = WorkerPool::new(test_registry(), PoolConfig::default().with_max_workers_per_kind(0));
    assert!(matches!(result, Err(PoolError::Config { .. })));
}

#[tokio::test]
async fn test_client_translates_through_pool() {
    let mut translator = MockTranslator::new();
    translator
        .expect_translate()
        .times(1)
        .returning(|_, _, _| Ok("hola".to_string()));
    let registry = TaskRegistry::with_defaults(Arc::new(translator), TranslateConfig::default());
    let pool = Arc::new(WorkerPool::new(registry, PoolConfig::default().with_max_workers_per_kind(1)).unwrap());
    let client = WorkerClient::new(pool);

    // Second call is served from the worker's cache
    assert_eq!(client.translate("hello", "en", "es").await.unwrap(), "hola");
    assert_eq!(client.translate("hello", "en", "es").await.unwrap(), "hola");
}

#[tokio::test]
async fn test_client_processes_rate_limit_batch() {
    let registry = TaskRegistry::with_defaults(Arc::new(MockTranslator::new()), TranslateConfig::default());
    let client = WorkerClient::new(Arc::new(WorkerPool::new(registry, PoolConfig::default()).unwrap()));

    let outcome = client
        .process_rate_limits(
            vec![CountdownEntry::new("a", 1500), CountdownEntry::new("b", 500)],
            vec![CountdownEntry::new("c", 1000)],
            1000,
        )
        .await
        .unwrap();

    assert_eq!(outcome.users.keep, vec![CountdownEntry::new("a", 500)]);
    assert_eq!(outcome.users.expired, vec!["b".to_string()]);
    assert!(outcome.limits.keep.is_empty());
    assert_eq!(outcome.limits.expired, vec!["c".to_string()]);
}
