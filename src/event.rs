//! Core event types shared across the extraction/validation/mutation pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single calendar appointment's raw field data, prior to validation.
///
/// Every field is text: nothing here is intrinsically typed. Validity is
/// established only by [`crate::validation::validate`]. Field names are
/// camelCase on the wire because that is the shape the language model emits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventRecord {
    /// Locally unique id, assigned by the working set on ingestion and never
    /// reused within a session. Never taken from a decoded payload.
    #[serde(skip_deserializing)]
    pub id: u64,
    pub subject: String,
    pub start_date: String,
    pub start_time: String,
    pub end_date: String,
    pub end_time: String,
    pub location: String,
    pub description: String,
}

impl EventRecord {
    pub fn new(subject: &str, start_date: &str, start_time: &str, end_date: &str, end_time: &str) -> Self {
        Self {
            id: 0,
            subject: subject.to_string(),
            start_date: start_date.to_string(),
            start_time: start_time.to_string(),
            end_date: end_date.to_string(),
            end_time: end_time.to_string(),
            location: String::new(),
            description: String::new(),
        }
    }
}

/// An [`EventRecord`] annotated with per-field error messages and an overall
/// validity verdict.
///
/// `is_valid` is always exactly "the errors map is empty" and is set in one
/// place only, inside `validate`. Callers never patch `errors` incrementally:
/// any field edit produces a brand-new validation pass over the whole record,
/// because the cross-field start-before-end rule can flip on a field the
/// caller did not touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedEventRecord {
    #[serde(flatten)]
    pub record: EventRecord,
    pub errors: BTreeMap<String, String>,
    pub is_valid: bool,
}

impl ValidatedEventRecord {
    /// Message of the form "field: message" per invalid field, for display.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|(field, msg)| format!("{}: {}", field, msg))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
