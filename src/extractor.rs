//! Recovery of a structured event array from raw model output.
//
// Text-only extraction requests carry a strict response schema, so the
// response is the JSON array verbatim and decoding is a direct, trusted
// parse. Requests with an inline binary attachment cannot enforce a schema;
// the model may then wrap its answer in prose or a fenced code block, and we
// have to dig the one top-level array out of the noise.

use crate::event::EventRecord;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Matches a fenced code block explicitly tagged as JSON.
static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```json\s*(.*?)```").unwrap());

const EXCERPT_LEN: usize = 120;

/// Why a model response could not be turned into an event array. Carries a
/// raw-text excerpt so the caller can show a meaningful retry prompt.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("model response was empty")]
    EmptyResponse,
    #[error("no structured data found in model response: {excerpt:?}")]
    NoStructure { excerpt: String },
    #[error("could not decode structured data: {source} (near {excerpt:?})")]
    Decode {
        #[source]
        source: serde_json::Error,
        excerpt: String,
    },
    #[error("model response decoded to {found}, expected an array (near {excerpt:?})")]
    NotAnArray { found: &'static str, excerpt: String },
}

/// Recover the event array from `raw`.
///
/// `strict_schema_requested` must reflect how the upstream request was made:
/// when a response schema was enforced, the whole (trimmed) text is decoded
/// directly; otherwise the candidate span is recovered as described on each
/// helper below.
pub fn extract(raw: &str, strict_schema_requested: bool) -> Result<Vec<EventRecord>, ExtractionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ExtractionError::EmptyResponse);
    }

    let candidate = if strict_schema_requested {
        trimmed
    } else if let Some(fenced) = JSON_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        debug!("extractor: using fenced code block interior");
        fenced.as_str().trim()
    } else if let Some(span) = balanced_span(trimmed) {
        debug!("extractor: recovered balanced span of {} bytes", span.len());
        span
    } else if trimmed.contains(['[', '{']) {
        // An opening delimiter with no balanced closer; last resort is the
        // whole text, which covers plain undecorated JSON.
        trimmed
    } else {
        return Err(ExtractionError::NoStructure { excerpt: excerpt(trimmed) });
    };

    decode_array(candidate)
}

/// Find the first balanced `[..]` or `{..}` span in `text`.
///
/// Whichever of `[` or `{` appears first fixes the delimiter pair; the scan
/// then tracks a nesting balance for that pair only, skipping over quoted
/// string interiors (with backslash escapes honored) so delimiter characters
/// inside string values never perturb the balance.
fn balanced_span(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let open = text.as_bytes()[start];
    let close = if open == b'[' { b']' } else { b'}' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in text.as_bytes().iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        if b == b'"' {
            in_string = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..=i]);
            }
        }
    }
    None
}

fn decode_array(candidate: &str) -> Result<Vec<EventRecord>, ExtractionError> {
    let value: Value = serde_json::from_str(candidate).map_err(|source| ExtractionError::Decode {
        source,
        excerpt: excerpt(candidate),
    })?;
    match value {
        Value::Array(_) => {
            serde_json::from_value(value).map_err(|source| ExtractionError::Decode {
                source,
                excerpt: excerpt(candidate),
            })
        }
        other => Err(ExtractionError::NotAnArray {
            found: json_type_name(&other),
            excerpt: excerpt(candidate),
        }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn excerpt(text: &str) -> String {
    let mut cut = EXCERPT_LEN.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_string()
}
