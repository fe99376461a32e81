//! Raw extracted records with provenance.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One extracted field value.
///
/// Extraction produces `Text`, `List` and `Missing`; the transformer may
/// convert values into the typed variants. A selector that matches nothing
/// yields `Missing`, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Missing,
}

impl FieldValue {
    /// The value as text, if it is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// A textual rendering for derived transforms and CSV output.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items.join(", "),
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Bool(v) => v.to_string(),
            FieldValue::Missing => String::new(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }
}

/// A record extracted from one page, before cleaning.
///
/// Field order follows the target's selector set. Provenance identifies
/// where and when the record was pulled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Field name to value, in selector-set order
    pub fields: IndexMap<String, FieldValue>,

    /// Target this record belongs to
    pub target: String,

    /// URL of the page the record came from
    pub source_url: String,

    /// 1-based page number within the seed walk
    pub page_number: usize,

    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,
}

impl RawRecord {
    pub fn new(
        target: impl Into<String>,
        source_url: impl Into<String>,
        page_number: usize,
    ) -> Self {
        Self {
            fields: IndexMap::new(),
            target: target.into(),
            source_url: source_url.into(),
            page_number,
            fetched_at: Utc::now(),
        }
    }

    /// Add a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Add a text field.
    pub fn with_text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_field(name, FieldValue::Text(value.into()))
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Flatten into a single JSON object: fields at the top level,
    /// provenance nested under `_meta`. This is the storage output shape.
    pub fn flattened(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (name, value) in &self.fields {
            map.insert(
                name.clone(),
                serde_json::to_value(value).unwrap_or(Value::Null),
            );
        }
        let mut meta = Map::new();
        meta.insert("target".into(), Value::String(self.target.clone()));
        meta.insert("source_url".into(), Value::String(self.source_url.clone()));
        meta.insert("page_number".into(), Value::from(self.page_number));
        meta.insert(
            "fetched_at".into(),
            Value::String(self.fetched_at.to_rfc3339()),
        );
        map.insert("_meta".into(), Value::Object(meta));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_serializes_untagged() {
        assert_eq!(
            serde_json::to_string(&FieldValue::Text("hi".into())).unwrap(),
            "\"hi\""
        );
        assert_eq!(serde_json::to_string(&FieldValue::Int(3)).unwrap(), "3");
        assert_eq!(
            serde_json::to_string(&FieldValue::Missing).unwrap(),
            "null"
        );
    }

    #[test]
    fn test_flattened_keeps_field_order_and_meta() {
        let record = RawRecord::new("quotes", "https://example.com/page/1", 1)
            .with_text("text", "Hello")
            .with_text("author", "Someone");

        let flat = record.flattened();
        let keys: Vec<_> = flat.keys().cloned().collect();
        assert_eq!(keys, vec!["text", "author", "_meta"]);
        assert_eq!(
            flat["_meta"]["source_url"],
            Value::String("https://example.com/page/1".into())
        );
    }

    #[test]
    fn test_render() {
        assert_eq!(FieldValue::Text("a".into()).render(), "a");
        assert_eq!(
            FieldValue::List(vec!["a".into(), "b".into()]).render(),
            "a, b"
        );
        assert_eq!(FieldValue::Missing.render(), "");
    }
}
