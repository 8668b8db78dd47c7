//! Event token extraction.
//!
//! A batch document looks like `{"batch": [{"event": "Order Completed"}, ...]}`.
//! Each element contributes one line to the append log: the value of the
//! first field in the priority list that holds a non-empty string.

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::DEFAULT_FIELD_PRIORITY;

/// Field holding the sequence of events.
pub const DEFAULT_BATCH_FIELD: &str = "batch";

/// Tokens extracted from one batch, ready to append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedBatch {
    /// Newline-terminated tokens in batch order.
    pub content: String,
    /// Number of tokens in `content`.
    pub events: usize,
    /// Number of batch elements that carried no usable token.
    pub skipped: usize,
}

impl ExtractedBatch {
    pub fn is_empty(&self) -> bool {
        self.events == 0
    }

    #[cfg(test)]
    fn tokens(&self) -> impl Iterator<Item = &str> {
        self.content.lines()
    }

    fn push(&mut self, token: &str) {
        // One token, one line.
        if token.contains(['\n', '\r']) {
            self.content.push_str(&token.replace(['\n', '\r'], " "));
        } else {
            self.content.push_str(token);
        }
        self.content.push('\n');
        self.events += 1;
    }
}

/// Pulls event tokens out of a parsed batch document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventExtractor {
    batch_field: String,
    field_priority: Vec<String>,
}

impl Default for EventExtractor {
    fn default() -> Self {
        EventExtractor::new(DEFAULT_BATCH_FIELD, DEFAULT_FIELD_PRIORITY)
    }
}

impl EventExtractor {
    /// Creates an extractor reading events from `batch_field` and taking each
    /// token from the first of `field_priority` present on the event.
    pub fn new<I, S>(batch_field: impl Into<String>, field_priority: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EventExtractor {
            batch_field: batch_field.into(),
            field_priority: field_priority.into_iter().map(Into::into).collect(),
        }
    }

    pub fn field_priority(&self) -> &[String] {
        &self.field_priority
    }

    /// Extracts one token per usable batch element, preserving order.
    ///
    /// A missing, null, empty or non-array batch field yields an empty
    /// result rather than an error.
    pub fn extract(&self, document: &Map<String, Value>) -> ExtractedBatch {
        let mut extracted = ExtractedBatch::default();

        let events = match document.get(&self.batch_field) {
            None | Some(Value::Null) => return extracted,
            Some(Value::Array(events)) => events,
            Some(other) => {
                debug!(
                    field = %self.batch_field,
                    kind = json_kind(other),
                    "Batch field is not an array, treating as empty"
                );
                return extracted;
            }
        };

        for event in events {
            match self.token_of(event) {
                Some(token) => extracted.push(token),
                None => extracted.skipped += 1,
            }
        }

        extracted
    }

    /// Returns the token of a single event, if it has one.
    pub fn token_of<'a>(&self, event: &'a Value) -> Option<&'a str> {
        let object = event.as_object()?;
        self.field_priority
            .iter()
            .filter_map(|field| object.get(field).and_then(Value::as_str))
            .find(|token| !token.is_empty())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
