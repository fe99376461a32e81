//! CSV storage. The whole batch is written at once: the header is the
//! union of field names across the batch plus the provenance columns.

use async_trait::async_trait;
use indexmap::IndexSet;
use std::path::PathBuf;
use tracing::debug;

use crate::error::StorageError;
use crate::traits::StorageAdapter;
use crate::types::RawRecord;

const META_COLUMNS: [&str; 4] = ["_target", "_source_url", "_page_number", "_fetched_at"];

/// Writes one CSV file per save, replacing any previous contents.
pub struct CsvStore {
    path: PathBuf,
    delimiter: char,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: ',',
        }
    }

    /// Use a delimiter other than a comma.
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    fn escape(&self, value: &str) -> String {
        if value.contains(self.delimiter)
            || value.contains('"')
            || value.contains('\n')
            || value.contains('\r')
        {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }

    fn render(&self, records: &[RawRecord]) -> String {
        // Union of field names in first-seen order, then provenance.
        let mut columns: IndexSet<String> = IndexSet::new();
        for record in records {
            for name in record.fields.keys() {
                columns.insert(name.clone());
            }
        }

        let delimiter = self.delimiter.to_string();
        let mut out = String::new();
        let header: Vec<String> = columns
            .iter()
            .map(|c| self.escape(c))
            .chain(META_COLUMNS.iter().map(|c| c.to_string()))
            .collect();
        out.push_str(&header.join(&delimiter));
        out.push('\n');

        for record in records {
            let mut row: Vec<String> = columns
                .iter()
                .map(|name| {
                    record
                        .get(name)
                        .map(|value| self.escape(&value.render()))
                        .unwrap_or_default()
                })
                .collect();
            row.push(self.escape(&record.target));
            row.push(self.escape(&record.source_url));
            row.push(record.page_number.to_string());
            row.push(record.fetched_at.to_rfc3339());
            out.push_str(&row.join(&delimiter));
            out.push('\n');
        }
        out
    }
}

#[async_trait]
impl StorageAdapter for CsvStore {
    async fn save(&self, records: &[RawRecord]) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(&self.path, self.render(records)).await?;
        debug!(path = %self.path.display(), records = records.len(), "csv written");
        Ok(())
    }

    fn name(&self) -> &str {
        "csv"
    }
}
