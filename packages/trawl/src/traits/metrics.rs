use crate::types::RunResult;

/// Receives run-level counters as they finish. Implementations must be
/// cheap; the orchestrator calls them on the run's hot path.
pub trait MetricsSink: Send + Sync {
    fn record_pages(&self, target: &str, fetched: usize, skipped: usize, failed: usize);
    fn record_records(&self, target: &str, extracted: usize, cleaned: usize, stored: usize);
    fn record_run(&self, result: &RunResult);
}

/// Discards all metrics.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_pages(&self, _target: &str, _fetched: usize, _skipped: usize, _failed: usize) {}
    fn record_records(&self, _target: &str, _extracted: usize, _cleaned: usize, _stored: usize) {}
    fn record_run(&self, _result: &RunResult) {}
}
