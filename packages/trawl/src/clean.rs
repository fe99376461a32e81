//! The built-in record cleaner: text normalization, missing-value policy,
//! required fields and deduplication.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::traits::{CleanOutcome, Cleaner};
use crate::types::{ErrorSummary, FieldValue, RawRecord};

/// What to do with records that have missing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MissingValueRule {
    /// Fill named fields with default text
    Default { values: HashMap<String, String> },

    /// Drop the record when any named field is missing
    Drop { fields: Vec<String> },
}

/// Cleaning configuration for one target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// Drop records whose key fields repeat an earlier record
    pub remove_duplicates: bool,

    /// Fields forming the duplicate key; empty means all fields
    pub duplicate_keys: Vec<String>,

    pub missing: Option<MissingValueRule>,

    /// Records missing any of these are dropped regardless of `missing`
    pub required_fields: Vec<String>,
}

/// Applies [`CleanerConfig`] to a batch: normalize text, apply the
/// missing-value rule, enforce required fields, dedupe.
pub struct RecordCleaner {
    config: CleanerConfig,
}

impl RecordCleaner {
    pub fn new(config: CleanerConfig) -> Self {
        Self { config }
    }

    fn duplicate_key(&self, record: &RawRecord) -> String {
        let mut hasher = Sha256::new();
        if self.config.duplicate_keys.is_empty() {
            for (name, value) in &record.fields {
                hasher.update(name.as_bytes());
                hasher.update([0]);
                hasher.update(value.render().as_bytes());
                hasher.update([0]);
            }
        } else {
            for name in &self.config.duplicate_keys {
                hasher.update(name.as_bytes());
                hasher.update([0]);
                if let Some(value) = record.get(name) {
                    hasher.update(value.render().as_bytes());
                }
                hasher.update([0]);
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

impl Cleaner for RecordCleaner {
    fn clean(&self, records: Vec<RawRecord>) -> CleanOutcome {
        let mut outcome = CleanOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();

        'records: for mut record in records {
            for value in record.fields.values_mut() {
                normalize_value(value);
            }

            match &self.config.missing {
                Some(MissingValueRule::Default { values }) => {
                    for (name, default) in values {
                        if record.get(name).map(FieldValue::is_missing).unwrap_or(false) {
                            record
                                .fields
                                .insert(name.clone(), FieldValue::Text(default.clone()));
                        }
                    }
                }
                Some(MissingValueRule::Drop { fields }) => {
                    for name in fields {
                        if record.get(name).map(FieldValue::is_missing).unwrap_or(true) {
                            outcome.dropped += 1;
                            outcome.errors.push(ErrorSummary::record(format!(
                                "record from {} dropped: field `{name}` missing",
                                record.source_url
                            )));
                            continue 'records;
                        }
                    }
                }
                None => {}
            }

            for name in &self.config.required_fields {
                let missing = match record.get(name) {
                    Some(value) => value.is_missing() || value.render().is_empty(),
                    None => true,
                };
                if missing {
                    outcome.dropped += 1;
                    outcome.errors.push(ErrorSummary::record(format!(
                        "record from {} dropped: required field `{name}` empty",
                        record.source_url
                    )));
                    continue 'records;
                }
            }

            if self.config.remove_duplicates && !seen.insert(self.duplicate_key(&record)) {
                debug!(source_url = %record.source_url, "duplicate record dropped");
                outcome.dropped += 1;
                continue;
            }

            outcome.records.push(record);
        }

        outcome
    }
}

fn normalize_value(value: &mut FieldValue) {
    match value {
        FieldValue::Text(text) => *text = normalize_text(text),
        FieldValue::List(items) => {
            for item in items.iter_mut() {
                *item = normalize_text(item);
            }
        }
        _ => {}
    }
}

/// Trim, collapse runs of whitespace, and strip control characters other
/// than tab and newline.
fn normalize_text(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(text: &str) -> RawRecord {
        RawRecord::new("t", "https://example.com", 1).with_text("text", text)
    }

    #[test]
    fn test_normalizes_whitespace_and_control_chars() {
        let cleaner = RecordCleaner::new(CleanerConfig::default());
        let outcome = cleaner.clean(vec![record("  hello\u{0000}   world\n ")]);
        assert_eq!(
            outcome.records[0].get("text").unwrap().as_text(),
            Some("hello world")
        );
    }

    #[test]
    fn test_missing_default_fills_field() {
        let config = CleanerConfig {
            missing: Some(MissingValueRule::Default {
                values: HashMap::from([("author".to_string(), "unknown".to_string())]),
            }),
            ..Default::default()
        };
        let input = record("hi").with_field("author", FieldValue::Missing);
        let outcome = RecordCleaner::new(config).clean(vec![input]);
        assert_eq!(
            outcome.records[0].get("author").unwrap().as_text(),
            Some("unknown")
        );
    }

    #[test]
    fn test_missing_drop_removes_record() {
        let config = CleanerConfig {
            missing: Some(MissingValueRule::Drop {
                fields: vec!["author".to_string()],
            }),
            ..Default::default()
        };
        let bad = record("hi").with_field("author", FieldValue::Missing);
        let good = record("there").with_text("author", "Alice");
        let outcome = RecordCleaner::new(config).clean(vec![bad, good]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_required_field_empty_after_normalize_drops() {
        let config = CleanerConfig {
            required_fields: vec!["text".to_string()],
            ..Default::default()
        };
        let outcome = RecordCleaner::new(config).clean(vec![record("   "), record("ok")]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.dropped, 1);
    }

    #[test]
    fn test_deduplication_on_key_fields() {
        let config = CleanerConfig {
            remove_duplicates: true,
            duplicate_keys: vec!["text".to_string()],
            ..Default::default()
        };
        let outcome = RecordCleaner::new(config).clean(vec![
            record("same").with_text("author", "a"),
            record("same").with_text("author", "b"),
            record("different"),
        ]);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.dropped, 1);
        // Duplicate drops are expected, not errors.
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_dedup_without_keys_uses_all_fields() {
        let config = CleanerConfig {
            remove_duplicates: true,
            ..Default::default()
        };
        let outcome = RecordCleaner::new(config).clean(vec![
            record("same").with_text("author", "a"),
            record("same").with_text("author", "b"),
        ]);
        assert_eq!(outcome.records.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_normalized_text_has_no_leading_trailing_or_double_spaces(s in ".*") {
            let normalized = normalize_text(&s);
            prop_assert_eq!(normalized.trim(), normalized.as_str());
            prop_assert!(!normalized.contains("  "));
            prop_assert!(!normalized.chars().any(|c| c.is_control()));
        }
    }
}
