//! In-memory storage, for tests and ad-hoc runs.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use crate::error::StorageError;
use crate::traits::StorageAdapter;
use crate::types::RawRecord;

/// Accumulates every saved record in memory.
#[derive(Default, Clone)]
pub struct MemoryStore {
    records: Arc<RwLock<Vec<RawRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything saved so far.
    pub fn records(&self) -> Vec<RawRecord> {
        self.records.read().expect("memory store lock poisoned").clone()
    }
}

#[async_trait]
impl StorageAdapter for MemoryStore {
    async fn save(&self, records: &[RawRecord]) -> Result<(), StorageError> {
        self.records
            .write()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".into()))?
            .extend_from_slice(records);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accumulates_across_saves() {
        let store = MemoryStore::new();
        let record = RawRecord::new("t", "https://example.com", 1).with_text("a", "1");
        store.save(&[record.clone()]).await.unwrap();
        store.save(&[record]).await.unwrap();
        assert_eq!(store.records().len(), 2);
    }
}
