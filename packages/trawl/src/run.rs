//! Run orchestration: walk, clean, transform, store, notify.
//!
//! A run never raises; every outcome is folded into the [`RunResult`].
//! Page-level failures leave the run partial, storage failure or an empty
//! scrape fails it, and notification failures are only logged.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{CompiledTarget, ScrapePolicy};
use crate::fetch::{FetchClient, RobotsGuard};
use crate::traits::{
    Cleaner, MetricsSink, NoopCleaner, NoopMetrics, NoopTransformer, Notifier, StorageAdapter,
    Transformer,
};
use crate::types::{ErrorSummary, RunCounts, RunResult, RunStatus, WalkTerminal};
use crate::walker::PaginationWalker;

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Walk and process but skip storage
    pub dry_run: bool,

    /// Cancels the run cooperatively
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            dry_run: false,
            cancel,
        }
    }
}

/// Drives one target through the full pipeline and owns the shared
/// collaborators. Cheap to clone the Arcs out of; one orchestrator serves
/// any number of concurrent runs.
pub struct RunOrchestrator {
    client: Arc<FetchClient>,
    robots: Arc<RobotsGuard>,
    policy: ScrapePolicy,
    cleaner: Arc<dyn Cleaner>,
    transformer: Arc<dyn Transformer>,
    store: Option<Arc<dyn StorageAdapter>>,
    notifier: Option<Arc<dyn Notifier>>,
    metrics: Arc<dyn MetricsSink>,
}

impl RunOrchestrator {
    pub fn new(client: Arc<FetchClient>, robots: Arc<RobotsGuard>, policy: ScrapePolicy) -> Self {
        Self {
            client,
            robots,
            policy,
            cleaner: Arc::new(NoopCleaner),
            transformer: Arc::new(NoopTransformer),
            store: None,
            notifier: None,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Set the cleaner.
    pub fn with_cleaner(mut self, cleaner: Arc<dyn Cleaner>) -> Self {
        self.cleaner = cleaner;
        self
    }

    /// Set the transformer.
    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = transformer;
        self
    }

    /// Set the storage backend.
    pub fn with_store(mut self, store: Arc<dyn StorageAdapter>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Set the metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run one target end to end. Never returns an error; every failure
    /// mode is reflected in the result's status and error summaries.
    pub async fn run(&self, target: &CompiledTarget, options: &RunOptions) -> RunResult {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let started = Instant::now();
        let mut counts = RunCounts::default();
        let mut errors: Vec<ErrorSummary> = Vec::new();

        info!(
            run_id = %run_id,
            target = target.name(),
            dry_run = options.dry_run,
            seeds = target.seeds.len(),
            "run started"
        );

        self.client.register_target(&target.config, &self.policy);

        let walker =
            PaginationWalker::new(target, self.client.clone(), self.robots.clone(), &self.policy);
        let walks = walker.walk(&options.cancel).await;

        let mut records = Vec::new();
        let mut cancelled = false;
        for walk in walks {
            counts.pages_fetched += walk.summary.pages_fetched;
            counts.pages_skipped += walk.summary.pages_skipped;
            counts.pages_failed += walk.summary.pages_failed;
            if matches!(walk.summary.terminal, WalkTerminal::Cancelled) {
                cancelled = true;
            }
            if let Some(error) = walk.error {
                errors.push(error);
            }
            records.extend(walk.records);
        }
        counts.records_extracted = records.len();

        if cancelled {
            errors.push(ErrorSummary::cancelled());
            return self.finalize(
                run_id, target, RunStatus::Failed, counts, errors, started, started_at, options,
            )
            .await;
        }

        // A run that produced nothing at all is a failure even when every
        // individual page "succeeded" by being skipped.
        if counts.pages_fetched == 0 && records.is_empty() {
            errors.push(ErrorSummary::extraction(
                "no pages fetched and no records extracted",
            ));
            return self.finalize(
                run_id, target, RunStatus::Failed, counts, errors, started, started_at, options,
            )
            .await;
        }

        let cleaned = self.cleaner.clean(records);
        counts.records_cleaned = cleaned.records.len();
        counts.records_dropped += cleaned.dropped;
        errors.extend(cleaned.errors);

        let transformed = self.transformer.transform(cleaned.records);
        // A transformer may emit more records than it received (e.g. one
        // record split per list item), so this must not underflow.
        counts.records_dropped += counts
            .records_cleaned
            .saturating_sub(transformed.records.len());
        errors.extend(transformed.errors);
        let records = transformed.records;

        if options.dry_run {
            info!(
                run_id = %run_id,
                target = target.name(),
                records = records.len(),
                "dry run, skipping storage"
            );
        } else if let Some(store) = &self.store {
            match store.save(&records).await {
                Ok(()) => {
                    counts.records_stored = records.len();
                    info!(
                        run_id = %run_id,
                        target = target.name(),
                        backend = store.name(),
                        records = counts.records_stored,
                        "records stored"
                    );
                }
                Err(err) => {
                    warn!(
                        run_id = %run_id,
                        target = target.name(),
                        backend = store.name(),
                        error = %err,
                        "storage failed"
                    );
                    errors.push(ErrorSummary::storage(err.to_string()));
                    return self.finalize(
                        run_id,
                        target,
                        RunStatus::Failed,
                        counts,
                        errors,
                        started,
                        started_at,
                        options,
                    )
                    .await;
                }
            }
        }

        let status = if errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };
        self.finalize(run_id, target, status, counts, errors, started, started_at, options)
            .await
    }

    /// Run several targets concurrently. Results come back in input order;
    /// one target's failure never affects another's run.
    pub async fn run_all(
        &self,
        targets: &[CompiledTarget],
        options: &RunOptions,
    ) -> Vec<RunResult> {
        join_all(targets.iter().map(|target| self.run(target, options))).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        run_id: String,
        target: &CompiledTarget,
        status: RunStatus,
        counts: RunCounts,
        errors: Vec<ErrorSummary>,
        started: Instant,
        started_at: chrono::DateTime<Utc>,
        options: &RunOptions,
    ) -> RunResult {
        let result = RunResult {
            run_id,
            target: target.name().to_string(),
            status,
            counts,
            duration_ms: started.elapsed().as_millis() as u64,
            dry_run: options.dry_run,
            started_at,
            errors,
        };

        self.metrics.record_pages(
            &result.target,
            counts.pages_fetched,
            counts.pages_skipped,
            counts.pages_failed,
        );
        self.metrics.record_records(
            &result.target,
            counts.records_extracted,
            counts.records_cleaned,
            counts.records_stored,
        );
        self.metrics.record_run(&result);

        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.notify(&result).await {
                warn!(
                    run_id = %result.run_id,
                    target = %result.target,
                    error = %err,
                    "notification failed"
                );
            }
        }

        info!(
            run_id = %result.run_id,
            target = %result.target,
            status = ?result.status,
            pages_fetched = counts.pages_fetched,
            pages_failed = counts.pages_failed,
            records_stored = counts.records_stored,
            errors = result.errors.len(),
            duration_ms = result.duration_ms,
            "run finished"
        );

        result
    }
}
