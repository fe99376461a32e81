//! Collaborator seams the orchestrator drives: cleaning, transformation,
//! storage, notification and metrics. Each has a no-op default so callers
//! only wire what they need.

pub mod cleaner;
pub mod metrics;
pub mod notifier;
pub mod store;
pub mod transformer;

pub use cleaner::{CleanOutcome, Cleaner, NoopCleaner};
pub use metrics::{MetricsSink, NoopMetrics};
pub use notifier::Notifier;
pub use store::StorageAdapter;
pub use transformer::{NoopTransformer, TransformOutcome, Transformer};
