use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::RawRecord;

/// Persists a batch of finished records. A save failure is fatal to the
/// run that produced the batch.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn save(&self, records: &[RawRecord]) -> Result<(), StorageError>;

    /// Whether the backend is reachable and writable.
    async fn health_check(&self) -> bool {
        true
    }

    /// Backend name for logs.
    fn name(&self) -> &str;
}
