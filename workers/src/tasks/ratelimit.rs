//! Rate-limit batch protocol
//!
//! Decrements per-user countdowns and splits them into entries that are
//! still active and uids whose countdown ran out. Pure and deterministic, so
//! any worker of this kind can serve any batch.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::{WorkerError, WorkerResult};
use crate::traits::TaskProtocol;
use shared::messages::{decode_payload, encode_payload};
use shared::{BatchOutcome, CountdownEntry, Partition, RateLimitRequest, WorkerKind};

#[derive(Debug, Default)]
pub struct RateLimitProtocol;

impl RateLimitProtocol {
    pub fn new() -> Self {
        Self
    }
}

/// Deduplicate by uid (first occurrence wins), then split on `time_left - decrement > 0`
pub fn partition_countdowns(entries: &[CountdownEntry], decrement: i64) -> Partition {
    let mut seen = HashSet::with_capacity(entries.len());
    let mut partition = Partition::default();

    for entry in entries {
        if !seen.insert(entry.uid.as_str()) {
            continue;
        }

        let remaining = entry.time_left.saturating_sub(decrement);
        if remaining > 0 {
            partition.keep.push(CountdownEntry::new(entry.uid.clone(), remaining));
        } else {
            partition.expired.push(entry.uid.clone());
        }
    }

    partition
}

/// Process both collections independently
pub fn process_batch(users: &[CountdownEntry], limits: &[CountdownEntry], decrement: i64) -> BatchOutcome {
    BatchOutcome {
        users: partition_countdowns(users, decrement),
        limits: partition_countdowns(limits, decrement),
    }
}

#[async_trait]
impl TaskProtocol for RateLimitProtocol {
    fn kind(&self) -> WorkerKind {
        WorkerKind::RATE_LIMIT
    }

    async fn handle(&mut self, payload: serde_json::Value) -> WorkerResult<serde_json::Value> {
        let RateLimitRequest::Process { users, limits, decrement } =
            decode_payload(payload).map_err(WorkerError::invalid_payload)?;
        let outcome = process_batch(&users, &limits, decrement);
        Ok(encode_payload(&outcome)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_above_decrement_is_kept_with_remaining_time() {
        let partition = partition_countdowns(&[CountdownEntry::new("a", 1500)], 1000);
        assert_eq!(partition.keep, vec![CountdownEntry::new("a", 500)]);
        assert!(partition.expired.is_empty());
    }

    #[test]
    fn test_entry_at_or_below_decrement_expires() {
        let partition = partition_countdowns(&[CountdownEntry::new("a", 500)], 1000);
        assert!(partition.keep.is_empty());
        assert_eq!(partition.expired, vec!["a".to_string()]);

        let exact = partition_countdowns(&[CountdownEntry::new("b", 1000)], 1000);
        assert_eq!(exact.expired, vec!["b".to_string()]);
    }

    #[test]
    fn test_duplicate_uids_collapse_to_first_occurrence() {
        let entries = vec![
            CountdownEntry::new("a", 5000),
            CountdownEntry::new("b", 200),
            CountdownEntry::new("a", 100),
        ];

        let partition = partition_countdowns(&entries, 1000);
        assert_eq!(partition.keep, vec![CountdownEntry::new("a", 4000)]);
        assert_eq!(partition.expired, vec!["b".to_string()]);
    }

    #[test]
    fn test_collections_are_partitioned_independently() {
        let outcome = process_batch(
            &[CountdownEntry::new("a", 1500)],
            &[CountdownEntry::new("a", 900)],
            1000,
        );
        assert_eq!(outcome.users.keep, vec![CountdownEntry::new("a", 500)]);
        assert_eq!(outcome.limits.expired, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_protocol_handles_wire_payload() {
        let mut protocol = RateLimitProtocol::new();
        let reply = protocol
            .handle(json!({
                "type": "process",
                "users": [{ "uid": "a", "time_left": 1500 }, { "uid": "c", "time_left": 10 }],
                "limits": [],
                "decrement": 1000
            }))
            .await
            .unwrap();

        assert_eq!(
            reply,
            json!({
                "users": { "keep": [{ "uid": "a", "time_left": 500 }], "expired": ["c"] },
                "limits": { "keep": [], "expired": [] }
            })
        );
    }

    #[tokio::test]
    async fn test_protocol_rejects_unknown_operation() {
        let mut protocol = RateLimitProtocol::new();
        let result = protocol.handle(json!({ "type": "flush" })).await;
        assert!(matches!(result, Err(WorkerError::InvalidPayload { .. })));
    }
}
