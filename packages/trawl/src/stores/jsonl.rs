//! JSON Lines storage: one flattened record per line, appended per run.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StorageError;
use crate::traits::StorageAdapter;
use crate::types::RawRecord;

/// Appends records to a `.jsonl` file, creating it (and parent
/// directories) on first save.
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl StorageAdapter for JsonlStore {
    async fn save(&self, records: &[RawRecord]) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(&record.flattened())?);
            buffer.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %self.path.display(), records = records.len(), "records appended");
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                parent.exists() || tokio::fs::create_dir_all(parent).await.is_ok()
            }
            _ => true,
        }
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn test_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let store = JsonlStore::new(&path);

        let a = RawRecord::new("t", "https://example.com/1", 1).with_text("text", "one");
        let b = RawRecord::new("t", "https://example.com/2", 2).with_text("text", "two");
        store.save(&[a]).await.unwrap();
        store.save(&[b]).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["text"], "one");
        assert_eq!(parsed["_meta"]["page_number"], 1);
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/out.jsonl");
        let store = JsonlStore::new(&path);

        let record = RawRecord::new("t", "https://example.com", 1).with_text("x", "y");
        store.save(&[record]).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        JsonlStore::new(&path).save(&[]).await.unwrap();
        assert!(!path.exists());
    }
}
