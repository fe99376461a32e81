//! CSS-selector extraction of records from fetched HTML.
//!
//! Selectors are compiled once per target at load time; extraction itself
//! is pure and synchronous. Parsed documents never cross an await point.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::config::{FieldRule, PaginationRule, SelectorSet};
use crate::error::{ConfigError, ConfigResult};
use crate::types::{FieldValue, RawRecord};

#[derive(Debug, Clone)]
enum CompiledField {
    Text(Selector),
    Attr(Selector, String),
    TextList(Selector),
}

/// A target's selector set, compiled and ready to apply to documents.
#[derive(Debug, Clone)]
pub struct Extractor {
    item: Option<Selector>,
    fields: Vec<(String, CompiledField)>,
    next_page: Option<Selector>,
}

impl Extractor {
    /// Compile a selector set. Any selector that does not parse is a
    /// [`ConfigError::Selector`] naming the field it came from.
    pub fn compile(
        target: &str,
        set: &SelectorSet,
        pagination: &PaginationRule,
    ) -> ConfigResult<Self> {
        let item = set
            .item
            .as_deref()
            .map(|s| compile_selector(s, format!("item selector of target `{target}`")))
            .transpose()?;

        let mut fields = Vec::with_capacity(set.fields.len());
        for (name, rule) in &set.fields {
            let context = format!("field `{name}` of target `{target}`");
            let selector = compile_selector(rule.selector(), context)?;
            let compiled = match rule {
                FieldRule::Text { .. } => CompiledField::Text(selector),
                FieldRule::Attr { attr, .. } => CompiledField::Attr(selector, attr.clone()),
                FieldRule::TextList { .. } => CompiledField::TextList(selector),
            };
            fields.push((name.clone(), compiled));
        }

        let next_page = pagination
            .enabled
            .then(|| pagination.next_selector.as_deref())
            .flatten()
            .map(|s| compile_selector(s, format!("next_selector of target `{target}`")))
            .transpose()?;

        Ok(Self {
            item,
            fields,
            next_page,
        })
    }

    /// Extract records and the next-page URL from one page.
    ///
    /// Zero item matches yields an empty vec, not an error. Relative
    /// next-page links resolve against `doc_url` (the final URL after
    /// redirects).
    pub fn extract(
        &self,
        target: &str,
        doc_url: &Url,
        html: &str,
        page_number: usize,
    ) -> (Vec<RawRecord>, Option<Url>) {
        let doc = Html::parse_document(html);

        let mut records = Vec::new();
        match &self.item {
            Some(item) => {
                for element in doc.select(item) {
                    records.push(self.extract_one(target, doc_url, element, page_number));
                }
            }
            None => {
                // No container selector: the whole document is one record.
                records.push(self.extract_one(target, doc_url, doc.root_element(), page_number));
            }
        }

        let next = self.next_url(&doc, doc_url);
        debug!(
            url = %doc_url,
            page = page_number,
            records = records.len(),
            has_next = next.is_some(),
            "page extracted"
        );

        (records, next)
    }

    fn extract_one(
        &self,
        target: &str,
        doc_url: &Url,
        scope: ElementRef<'_>,
        page_number: usize,
    ) -> RawRecord {
        let mut record = RawRecord::new(target, doc_url.as_str(), page_number);
        for (name, field) in &self.fields {
            let value = match field {
                CompiledField::Text(selector) => scope
                    .select(selector)
                    .next()
                    .map(|el| FieldValue::Text(text_of(el)))
                    .unwrap_or(FieldValue::Missing),
                CompiledField::Attr(selector, attr) => scope
                    .select(selector)
                    .next()
                    .and_then(|el| el.value().attr(attr))
                    .map(|v| FieldValue::Text(v.trim().to_string()))
                    .unwrap_or(FieldValue::Missing),
                CompiledField::TextList(selector) => {
                    let items: Vec<String> = scope.select(selector).map(text_of).collect();
                    if items.is_empty() {
                        FieldValue::Missing
                    } else {
                        FieldValue::List(items)
                    }
                }
            };
            record.fields.insert(name.clone(), value);
        }
        record
    }

    /// The absolute URL of the next page, if the document links one.
    /// Prefers the element's href; falls back to its text content.
    fn next_url(&self, doc: &Html, doc_url: &Url) -> Option<Url> {
        let selector = self.next_page.as_ref()?;
        let element = doc.select(selector).next()?;
        let raw = match element.value().attr("href") {
            Some(href) => href.trim().to_string(),
            None => text_of(element),
        };
        if raw.is_empty() {
            return None;
        }
        doc_url.join(&raw).ok()
    }
}

fn compile_selector(raw: &str, context: String) -> ConfigResult<Selector> {
    Selector::parse(raw).map_err(|_| ConfigError::Selector {
        context,
        selector: raw.to_string(),
    })
}

/// Text content of an element with whitespace collapsed.
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
