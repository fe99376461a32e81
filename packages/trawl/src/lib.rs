//! Scheduled web extraction: rate-limited fetching, CSS-selector
//! extraction, pagination walks and run orchestration.
//!
//! The engine is built from small collaborators wired into a
//! [`RunOrchestrator`]: a [`FetchClient`] paced by a [`RequestPacer`] and
//! checked by a [`RobotsGuard`] feeds pages to an [`Extractor`]; a
//! [`PaginationWalker`] drives the fetch-extract loop per seed; cleaned and
//! transformed records land in a [`StorageAdapter`]. A run never panics or
//! raises: every outcome, partial failures included, is folded into a
//! [`RunResult`].
//!
//! [`FetchClient`]: fetch::FetchClient
//! [`RequestPacer`]: fetch::RequestPacer
//! [`RobotsGuard`]: fetch::RobotsGuard
//! [`Extractor`]: extract::Extractor
//! [`PaginationWalker`]: walker::PaginationWalker
//! [`StorageAdapter`]: traits::StorageAdapter
//! [`RunOrchestrator`]: run::RunOrchestrator
//! [`RunResult`]: types::RunResult

pub mod clean;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod metrics;
pub mod notify;
pub mod run;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod transform;
pub mod types;
pub mod walker;

pub use clean::{CleanerConfig, MissingValueRule, RecordCleaner};
pub use config::{
    CompiledTarget, FieldRule, PaginationRule, ScrapePolicy, SelectorSet, TargetConfig,
};
pub use error::{ConfigError, ConfigResult, FetchError, NotifyError, StorageError};
pub use extract::Extractor;
pub use fetch::{FetchClient, FetchPolicy, RequestPacer, ReqwestTransport, RobotsGuard};
pub use metrics::{InMemoryMetrics, MetricsSnapshot};
pub use notify::{LogNotifier, WebhookNotifier};
pub use run::{RunOptions, RunOrchestrator};
pub use stores::{CsvStore, JsonlStore, MemoryStore};
pub use traits::{Cleaner, MetricsSink, Notifier, StorageAdapter, Transformer};
pub use transform::{RecordTransformer, TransformFn, TransformerConfig};
pub use types::{RawRecord, RunResult, RunStatus};
