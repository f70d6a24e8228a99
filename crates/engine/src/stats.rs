//! Per-component counters for dashboards
//!
//! Nothing in the engine reads these to make decisions.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::context::{RecordedError, RecoveryOutcome};

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> OperationCounts {
        OperationCounts {
            total: self.total.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Counters for one operation name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCounts {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
}

/// Live counters for one component
#[derive(Debug, Default)]
pub struct OperationStats {
    overall: Counters,
    circuit_rejections: AtomicU64,
    rate_limited: AtomicU64,
    fallbacks: AtomicU64,
    escalations: AtomicU64,
    per_operation: DashMap<String, Counters>,
}

impl OperationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an attempt after the first
    pub fn record_retry(&self, operation: &str) {
        self.overall.retries.fetch_add(1, Ordering::Relaxed);
        self.per_operation
            .entry(operation.to_string())
            .or_default()
            .retries
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Count the terminal outcome of one call
    pub fn record_outcome(&self, operation: &str, outcome: RecoveryOutcome) {
        let op = self.per_operation.entry(operation.to_string()).or_default();
        self.overall.total.fetch_add(1, Ordering::Relaxed);
        op.total.fetch_add(1, Ordering::Relaxed);

        match outcome {
            RecoveryOutcome::Success => {
                self.overall.successes.fetch_add(1, Ordering::Relaxed);
                op.successes.fetch_add(1, Ordering::Relaxed);
            }
            RecoveryOutcome::CircuitOpen => {
                self.circuit_rejections.fetch_add(1, Ordering::Relaxed);
            }
            RecoveryOutcome::RateLimited => {
                self.rate_limited.fetch_add(1, Ordering::Relaxed);
            }
            RecoveryOutcome::RetryPending => {}
            RecoveryOutcome::FallbackUsed
            | RecoveryOutcome::Escalated
            | RecoveryOutcome::Aborted
            | RecoveryOutcome::Failed => {
                self.overall.failures.fetch_add(1, Ordering::Relaxed);
                op.failures.fetch_add(1, Ordering::Relaxed);
                match outcome {
                    RecoveryOutcome::FallbackUsed => {
                        self.fallbacks.fetch_add(1, Ordering::Relaxed);
                    }
                    RecoveryOutcome::Escalated => {
                        self.escalations.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let overall = self.overall.snapshot();
        let failure_rate = if overall.total == 0 {
            0.0
        } else {
            overall.failures as f64 / overall.total as f64
        };

        StatsSnapshot {
            total_calls: overall.total,
            successes: overall.successes,
            failures: overall.failures,
            retries: overall.retries,
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            fallbacks_used: self.fallbacks.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            failure_rate,
            operations: self
                .per_operation
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().snapshot()))
                .collect(),
        }
    }
}

/// Point-in-time copy of [`OperationStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub circuit_rejections: u64,
    pub rate_limited: u64,
    pub fallbacks_used: u64,
    pub escalations: u64,
    /// failures / total_calls (0.0 when idle)
    pub failure_rate: f64,
    pub operations: BTreeMap<String, OperationCounts>,
}

/// Bounded buffer of the most recent errors for a component
#[derive(Debug)]
pub struct ErrorHistory {
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

/// A recorded error tagged with the operation it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub operation: String,
    #[serde(flatten)]
    pub error: RecordedError,
}

impl ErrorHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn push(&self, operation: &str, error: RecordedError) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(HistoryEntry {
            operation: operation.to_string(),
            error,
        });
    }

    /// Up to `limit` entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ErrorSource;
    use crate::error::OperationError;

    fn recorded(msg: &str) -> RecordedError {
        RecordedError {
            attempt: 1,
            source: ErrorSource::Attempt,
            error: OperationError::other(msg),
            at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_outcome_counting() {
        let stats = OperationStats::new();
        stats.record_outcome("send", RecoveryOutcome::Success);
        stats.record_retry("send");
        stats.record_retry("send");
        stats.record_outcome("send", RecoveryOutcome::Failed);
        stats.record_outcome("send", RecoveryOutcome::CircuitOpen);
        stats.record_outcome("fetch", RecoveryOutcome::FallbackUsed);

        let snap = stats.snapshot();
        assert_eq!(snap.total_calls, 4);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 2);
        assert_eq!(snap.retries, 2);
        assert_eq!(snap.circuit_rejections, 1);
        assert_eq!(snap.fallbacks_used, 1);
        assert_eq!(snap.failure_rate, 0.5);

        assert_eq!(snap.operations["send"].total, 3);
        assert_eq!(snap.operations["send"].retries, 2);
        assert_eq!(snap.operations["fetch"].failures, 1);
    }

    #[test]
    fn test_idle_failure_rate() {
        assert_eq!(OperationStats::new().snapshot().failure_rate, 0.0);
    }

    #[test]
    fn test_history_is_bounded_and_newest_first() {
        let history = ErrorHistory::new(3);
        for i in 0..5 {
            history.push("op", recorded(&format!("e{i}")));
        }
        assert_eq!(history.len(), 3);

        let recent = history.recent(10);
        let messages: Vec<_> = recent.iter().map(|e| e.error.error.message.as_str()).collect();
        assert_eq!(messages, vec!["e4", "e3", "e2"]);
        assert_eq!(history.recent(1).len(), 1);
    }

    #[test]
    fn test_zero_capacity_history() {
        let history = ErrorHistory::new(0);
        history.push("op", recorded("dropped"));
        assert!(history.is_empty());
    }
}
