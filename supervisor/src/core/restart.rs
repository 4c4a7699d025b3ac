//! Restart budget with a crash-free reset window

use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Relaunch; `attempt` is the new restart count
    Restart { attempt: u32 },
    /// Budget spent; no further automatic restarts
    Exhausted { restart_count: u32 },
}

#[derive(Debug, Clone)]
pub struct RestartTracker {
    max_restarts: u32,
    reset_window: Duration,
    restart_count: u32,
    last_crash_time: Option<DateTime<Utc>>,
}

impl RestartTracker {
    pub fn new(max_restarts: u32, reset_window: Duration) -> Self {
        Self {
            max_restarts,
            reset_window,
            restart_count: 0,
            last_crash_time: None,
        }
    }

    /// Account for one unexpected exit observed at `now`
    pub fn record_crash(&mut self, now: DateTime<Utc>) -> RestartDecision {
        if let Some(last) = self.last_crash_time {
            // A clock that went backwards never resets the count
            if let Ok(elapsed) = (now - last).to_std() {
                if elapsed > self.reset_window {
                    self.restart_count = 0;
                }
            }
        }

        if self.restart_count < self.max_restarts {
            self.restart_count += 1;
            self.last_crash_time = Some(now);
            RestartDecision::Restart {
                attempt: self.restart_count,
            }
        } else {
            RestartDecision::Exhausted {
                restart_count: self.restart_count,
            }
        }
    }

    /// Operator-initiated restarts start with a full budget
    pub fn reset(&mut self) {
        self.restart_count = 0;
        self.last_crash_time = None;
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    pub fn max_restarts(&self) -> u32 {
        self.max_restarts
    }

    pub fn last_crash_time(&self) -> Option<DateTime<Utc>> {
        self.last_crash_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_ms(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_crash_after_reset_window_starts_over() {
        let mut tracker = RestartTracker::new(5, Duration::from_secs(3600));

        assert_eq!(tracker.record_crash(at_ms(0)), RestartDecision::Restart { attempt: 1 });
        assert_eq!(
            tracker.record_crash(at_ms(3_700_000)),
            RestartDecision::Restart { attempt: 1 }
        );
        assert_eq!(tracker.restart_count(), 1);
        assert_eq!(tracker.last_crash_time(), Some(at_ms(3_700_000)));
    }

    #[test]
    fn test_crashes_inside_window_accumulate() {
        let mut tracker = RestartTracker::new(5, Duration::from_secs(3600));
        tracker.record_crash(at_ms(0));
        assert_eq!(
            tracker.record_crash(at_ms(1_000)),
            RestartDecision::Restart { attempt: 2 }
        );
    }

    #[test]
    fn test_count_never_exceeds_budget() {
        let mut tracker = RestartTracker::new(3, Duration::from_secs(3600));

        let decisions: Vec<_> = (0..6).map(|i| tracker.record_crash(at_ms(i * 10))).collect();

        assert_eq!(decisions[2], RestartDecision::Restart { attempt: 3 });
        for decision in &decisions[3..] {
            assert_eq!(*decision, RestartDecision::Exhausted { restart_count: 3 });
        }
        assert_eq!(tracker.restart_count(), 3);
    }

    #[test]
    fn test_zero_budget_never_restarts() {
        let mut tracker = RestartTracker::new(0, Duration::from_secs(3600));
        assert_eq!(
            tracker.record_crash(at_ms(0)),
            RestartDecision::Exhausted { restart_count: 0 }
        );
    }

    #[test]
    fn test_reset_restores_full_budget() {
        let mut tracker = RestartTracker::new(1, Duration::from_secs(3600));
        tracker.record_crash(at_ms(0));
        assert!(matches!(tracker.record_crash(at_ms(1)), RestartDecision::Exhausted { .. }));

        tracker.reset();
        assert_eq!(tracker.record_crash(at_ms(2)), RestartDecision::Restart { attempt: 1 });
    }
}
