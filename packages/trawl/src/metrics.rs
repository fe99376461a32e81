//! In-process run metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::traits::MetricsSink;
use crate::types::{RunResult, RunStatus};

/// Process-wide counters, readable at any point via [`snapshot`].
///
/// [`snapshot`]: InMemoryMetrics::snapshot
#[derive(Default)]
pub struct InMemoryMetrics {
    pages_fetched: AtomicU64,
    pages_skipped: AtomicU64,
    pages_failed: AtomicU64,
    records_extracted: AtomicU64,
    records_cleaned: AtomicU64,
    records_stored: AtomicU64,
    run_duration_ms: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_partial: AtomicU64,
    runs_failed: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub pages_fetched: u64,
    pub pages_skipped: u64,
    pub pages_failed: u64,
    pub records_extracted: u64,
    pub records_cleaned: u64,
    pub records_stored: u64,
    /// Total wall time across all finished runs
    pub run_duration_ms: u64,
    pub runs_succeeded: u64,
    pub runs_partial: u64,
    pub runs_failed: u64,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            pages_skipped: self.pages_skipped.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            records_extracted: self.records_extracted.load(Ordering::Relaxed),
            records_cleaned: self.records_cleaned.load(Ordering::Relaxed),
            records_stored: self.records_stored.load(Ordering::Relaxed),
            run_duration_ms: self.run_duration_ms.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_partial: self.runs_partial.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_pages(&self, _target: &str, fetched: usize, skipped: usize, failed: usize) {
        self.pages_fetched.fetch_add(fetched as u64, Ordering::Relaxed);
        self.pages_skipped.fetch_add(skipped as u64, Ordering::Relaxed);
        self.pages_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    fn record_records(&self, _target: &str, extracted: usize, cleaned: usize, stored: usize) {
        self.records_extracted
            .fetch_add(extracted as u64, Ordering::Relaxed);
        self.records_cleaned
            .fetch_add(cleaned as u64, Ordering::Relaxed);
        self.records_stored.fetch_add(stored as u64, Ordering::Relaxed);
    }

    fn record_run(&self, result: &RunResult) {
        self.run_duration_ms
            .fetch_add(result.duration_ms, Ordering::Relaxed);
        let counter = match result.status {
            RunStatus::Success => &self.runs_succeeded,
            RunStatus::Partial => &self.runs_partial,
            RunStatus::Failed => &self.runs_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunCounts;

    #[test]
    fn test_counters_accumulate() {
        let metrics = InMemoryMetrics::new();
        metrics.record_pages("a", 3, 2, 1);
        metrics.record_pages("b", 2, 0, 0);
        metrics.record_records("a", 10, 9, 8);
        metrics.record_run(&RunResult {
            run_id: "r".into(),
            target: "a".into(),
            status: RunStatus::Partial,
            counts: RunCounts::default(),
            duration_ms: 250,
            dry_run: false,
            started_at: chrono::Utc::now(),
            errors: Vec::new(),
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pages_fetched, 5);
        assert_eq!(snapshot.pages_skipped, 2);
        assert_eq!(snapshot.pages_failed, 1);
        assert_eq!(snapshot.records_extracted, 10);
        assert_eq!(snapshot.records_cleaned, 9);
        assert_eq!(snapshot.records_stored, 8);
        assert_eq!(snapshot.run_duration_ms, 250);
        assert_eq!(snapshot.runs_partial, 1);
        assert_eq!(snapshot.runs_succeeded, 0);
    }
}
