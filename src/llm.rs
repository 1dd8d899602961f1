//! Client for the generative model used for event extraction and
//! natural-language filter queries.
//
// Mirrors the provider conventions used elsewhere in the ecosystem: API key
// from the environment, request bodies built with `json!`, and an LRU cache
// in front of repeat queries. The response is handed back as raw text; the
// structured extractor owns turning it into records.

use crate::config::Config;
use crate::filter::FilterCriteria;
use anyhow::{anyhow, Context, Result};
use base64::prelude::{Engine, BASE64_STANDARD};
use chrono::Local;
use log::{debug, warn};
use lru::LruCache;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

static FILTER_CACHE: Lazy<Mutex<LruCache<String, FilterCriteria>>> =
    Lazy::new(|| Mutex::new(LruCache::new(NonZeroUsize::new(100).unwrap())));

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const EXTRACTION_INSTRUCTION: &str = r#"Extract every calendar event from the provided content.
Respond with a JSON array only. Each element must have exactly these string fields:
subject, startDate, startTime, endDate, endTime, location, description.
Rules:
1. Use YYYY-MM-DD format for dates
2. Use 24-hour HH:MM format for times
3. Use an empty string for anything the content does not state
4. Do not invent events that are not in the content"#;

/// An inline binary attachment (document or image) for the model to read.
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    /// Load a file and guess its mime type from the extension. Actual
    /// format decoding is the model's job, not ours.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("could not read attachment {}", path.display()))?;
        let mime_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("pdf") => "application/pdf",
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("csv") => "text/csv",
            _ => "application/octet-stream",
        }
        .to_string();
        Ok(Self { mime_type, data })
    }
}

/// Raw model response plus how the request was made, so the extractor knows
/// whether it can trust the text to be schema-clean.
pub struct ExtractionResponse {
    pub raw_text: String,
    /// True when a strict response schema was enforced upstream. Only
    /// text-only requests support that; inline attachments disable it.
    pub strict_schema: bool,
}

/// Ask the model to extract events from pasted text and/or an attachment.
pub async fn request_event_extraction(
    text: Option<&str>,
    attachment: Option<&Attachment>,
) -> Result<ExtractionResponse> {
    if text.is_none() && attachment.is_none() {
        return Err(anyhow!("nothing to extract from: no text and no attachment"));
    }

    let mut prompt = EXTRACTION_INSTRUCTION.to_string();
    if let Some(text) = text {
        prompt.push_str("\n\nContent:\n");
        prompt.push_str(text);
    }

    let mut parts = vec![json!({ "text": prompt })];
    if let Some(att) = attachment {
        parts.push(json!({
            "inline_data": {
                "mime_type": att.mime_type,
                "data": BASE64_STANDARD.encode(&att.data),
            }
        }));
    }

    // Schema enforcement is only available for text-only requests.
    let strict_schema = attachment.is_none();
    let mut body = json!({ "contents": [{ "parts": parts }] });
    if strict_schema {
        body["generationConfig"] = json!({
            "response_mime_type": "application/json",
            "response_schema": event_array_schema(),
        });
    }

    let raw_text = send_generate_request(&body).await?;
    Ok(ExtractionResponse { raw_text, strict_schema })
}

/// Interpret a natural-language query ("everything in room 4 next week")
/// as filter criteria. The model's answer is validated by shape only: it
/// either decodes into [`FilterCriteria`] or the call fails.
pub async fn interpret_filter_query(query: &str) -> Result<FilterCriteria> {
    if let Some(cached) = FILTER_CACHE.lock().unwrap().get(query) {
        debug!("filter query served from cache");
        return Ok(cached.clone());
    }

    let today = Local::now().format("%Y-%m-%d");
    let prompt = format!(
        r#"Today is {today}. Translate the following calendar query into a JSON object
with these optional fields: dateFrom, dateTo (YYYY-MM-DD), text, location, timeOfDay (HH:MM).
Omit every field the query does not constrain. Respond with the JSON object only.

Query: {query}"#
    );

    let body = json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": { "response_mime_type": "application/json" },
    });
    let raw = send_generate_request(&body).await?;
    let criteria: FilterCriteria = serde_json::from_str(raw.trim())
        .with_context(|| format!("model returned an unusable filter shape: {raw}"))?;

    FILTER_CACHE.lock().unwrap().put(query.to_string(), criteria.clone());
    Ok(criteria)
}

/// POST a generateContent body, retrying transient overload a bounded number
/// of times with a fixed delay, and return the concatenated response text.
async fn send_generate_request(body: &Value) -> Result<String> {
    let api_key = env::var("GEMINI_API_KEY").map_err(|_| {
        anyhow!("GEMINI_API_KEY environment variable not set. Set it with: export GEMINI_API_KEY='your-key-here'")
    })?;
    let api_base = env::var("GEMINI_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
    let config = Config::load()?;
    let model = config.language_model.model;
    let max_retries = config.language_model.max_retries;
    let retry_delay = Duration::from_millis(config.language_model.retry_delay_ms);

    let url = format!("{}/models/{}:generateContent?key={}", api_base, model, api_key);
    let client = Client::new();

    let mut attempt = 0;
    loop {
        let response = client.post(&url).json(body).send().await?;
        let status = response.status();

        // Transient overload: bounded fixed-delay retry before giving up.
        if (status.as_u16() == 429 || status.as_u16() == 503) && attempt < max_retries {
            attempt += 1;
            warn!("model temporarily unavailable ({}), retry {}/{}", status, attempt, max_retries);
            tokio::time::sleep(retry_delay).await;
            continue;
        }

        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("model request failed ({}): {}", status, detail));
        }

        let value: Value = response.json().await?;
        return response_text(&value);
    }
}

/// Pull the generated text out of a generateContent response body.
fn response_text(value: &Value) -> Result<String> {
    let parts = value
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("model response has no candidates"))?;
    let text: String =
        parts.iter().filter_map(|p| p.get("text").and_then(Value::as_str)).collect();
    if text.is_empty() {
        return Err(anyhow!("model response contained no text parts"));
    }
    Ok(text)
}

/// Response schema for strict extraction: an array of event objects with
/// all-string fields.
fn event_array_schema() -> Value {
    let mut properties = serde_json::Map::new();
    for field in ["subject", "startDate", "startTime", "endDate", "endTime", "location", "description"] {
        properties.insert(field.to_string(), json!({ "type": "STRING" }));
    }
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": properties,
            "required": ["subject", "startDate", "startTime", "endDate", "endTime"],
        }
    })
}
