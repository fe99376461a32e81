//! The built-in record transformer: renames, type conversions and derived
//! fields.
//!
//! Derivations come from a closed set of named transforms rather than
//! user-supplied expressions, so a config can never execute arbitrary code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::traits::{TransformOutcome, Transformer};
use crate::types::{ErrorSummary, FieldValue, RawRecord};

/// Target type for a field conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    List,
}

/// One of the named derivation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformFn {
    Trim,
    Lowercase,
    Uppercase,
    Length,
    WordCount,
    Initials,
    Join,
}

impl TransformFn {
    fn apply(&self, input: &FieldValue) -> FieldValue {
        let text = input.render();
        match self {
            TransformFn::Trim => FieldValue::Text(text.trim().to_string()),
            TransformFn::Lowercase => FieldValue::Text(text.to_lowercase()),
            TransformFn::Uppercase => FieldValue::Text(text.to_uppercase()),
            TransformFn::Length => FieldValue::Int(text.chars().count() as i64),
            TransformFn::WordCount => {
                FieldValue::Int(text.split_whitespace().count() as i64)
            }
            TransformFn::Initials => FieldValue::Text(
                text.split_whitespace()
                    .filter_map(|word| word.chars().next())
                    .flat_map(|c| c.to_uppercase())
                    .collect(),
            ),
            // List items become one comma-separated string; scalars pass
            // through as their textual rendering.
            TransformFn::Join => FieldValue::Text(text),
        }
    }
}

/// A new field computed from an existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedField {
    pub name: String,
    pub source: String,
    pub transform: TransformFn,
}

/// Transformation configuration for one target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerConfig {
    /// Old field name to new field name
    pub rename: HashMap<String, String>,

    /// Field name to target type
    pub convert: HashMap<String, FieldType>,

    pub derive: Vec<DerivedField>,
}

/// Applies [`TransformerConfig`] to a batch. A record whose conversion
/// fails is dropped with an error summary; the rest of the batch is
/// unaffected.
pub struct RecordTransformer {
    config: TransformerConfig,
}

impl RecordTransformer {
    pub fn new(config: TransformerConfig) -> Self {
        Self { config }
    }

    fn transform_one(&self, mut record: RawRecord) -> Result<RawRecord, String> {
        for (old, new) in &self.config.rename {
            if let Some(value) = record.fields.shift_remove(old) {
                record.fields.insert(new.clone(), value);
            }
        }

        for (name, target_type) in &self.config.convert {
            if let Some(value) = record.get(name) {
                let converted = convert(value, *target_type)
                    .map_err(|e| format!("field `{name}`: {e}"))?;
                record.fields.insert(name.clone(), converted);
            }
        }

        for derived in &self.config.derive {
            let value = record
                .get(&derived.source)
                .map(|source| derived.transform.apply(source))
                .unwrap_or(FieldValue::Missing);
            record.fields.insert(derived.name.clone(), value);
        }

        Ok(record)
    }
}

impl Transformer for RecordTransformer {
    fn transform(&self, records: Vec<RawRecord>) -> TransformOutcome {
        let mut outcome = TransformOutcome::default();
        for record in records {
            let source_url = record.source_url.clone();
            match self.transform_one(record) {
                Ok(record) => outcome.records.push(record),
                Err(message) => {
                    debug!(source_url = %source_url, error = %message, "record dropped");
                    outcome.errors.push(ErrorSummary::record(format!(
                        "record from {source_url} dropped: {message}"
                    )));
                }
            }
        }
        outcome
    }
}

fn convert(value: &FieldValue, target: FieldType) -> Result<FieldValue, String> {
    if value.is_missing() {
        return Ok(FieldValue::Missing);
    }
    match target {
        FieldType::String => Ok(FieldValue::Text(value.render())),
        FieldType::Int => {
            let text = value.render();
            text.trim()
                .parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|_| format!("`{text}` is not an integer"))
        }
        FieldType::Float => {
            let text = value.render();
            text.trim()
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| format!("`{text}` is not a number"))
        }
        FieldType::Bool => {
            let text = value.render();
            match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(FieldValue::Bool(true)),
                "false" | "no" | "0" => Ok(FieldValue::Bool(false)),
                _ => Err(format!("`{text}` is not a boolean")),
            }
        }
        FieldType::List => match value {
            FieldValue::List(_) => Ok(value.clone()),
            other => Ok(FieldValue::List(vec![other.render()])),
        },
    }
}
