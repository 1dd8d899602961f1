//! Wire types for the remote calendar store.

use crate::event::ValidatedEventRecord;
use crate::validation::{parse_date, parse_time};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// A point on the calendar: either a timestamp or an all-day date, exactly
/// one of the two.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl EventTime {
    pub fn timestamp(dt: DateTime<FixedOffset>) -> Self {
        Self { date_time: Some(dt), date: None }
    }

    pub fn all_day(date: NaiveDate) -> Self {
        Self { date_time: None, date: Some(date) }
    }

    /// Calendar day this time falls on, for date-bound filtering.
    pub fn day(&self) -> Option<NaiveDate> {
        self.date_time.map(|dt| dt.date_naive()).or(self.date)
    }

    /// `HH:MM` for timed events, empty for all-day ones.
    pub fn clock(&self) -> Option<String> {
        self.date_time.map(|dt| dt.format("%H:%M").to_string())
    }
}

/// An event as the remote store reports it. Fetched, never locally
/// constructed except as the result of a successful insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteEvent {
    /// Store-assigned identifier; a distinct namespace from the local
    /// integer ids on [`crate::event::EventRecord`].
    pub id: String,
    /// Owning collection; not echoed by the store, filled in by the client.
    #[serde(skip_deserializing)]
    pub calendar_id: String,
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    pub location: Option<String>,
    pub description: Option<String>,
    pub html_link: Option<String>,
}

impl RemoteEvent {
    pub fn display_line(&self) -> String {
        let day = self.start.day().map(|d| d.to_string()).unwrap_or_default();
        let clock = self.start.clock().unwrap_or_else(|| "all-day".to_string());
        let mut line = format!("{} {} {} ({})", day, clock, self.summary, self.id);
        if let Some(location) = self.location.as_deref().filter(|l| !l.is_empty()) {
            line.push_str(&format!(" @ {}", location));
        }
        line
    }
}

/// Full field set for an insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EventPayload {
    /// Build an insert payload from a validated record. The record must have
    /// passed validation; its date fields are already canonical ISO.
    pub fn from_record(validated: &ValidatedEventRecord) -> Result<Self> {
        if !validated.is_valid {
            bail!("cannot build a payload from an invalid record: {}", validated.error_summary());
        }
        let record = &validated.record;
        let start = local_timestamp(&record.start_date, &record.start_time)?;
        let end = local_timestamp(&record.end_date, &record.end_time)?;
        Ok(Self {
            summary: record.subject.clone(),
            start: EventTime::timestamp(start),
            end: EventTime::timestamp(end),
            location: non_empty(&record.location),
            description: non_empty(&record.description),
        })
    }
}

/// A partial update built only from the fields the caller actually touched.
/// An explicit optional-field struct keeps the patch contract statically
/// checkable; untouched fields are never serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EventPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }

    pub fn start(mut self, start: EventTime) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: EventTime) -> Self {
        self.end = Some(end);
        self
    }

    pub fn location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Combine canonical date and time fields into a timestamp carrying the
/// machine's local offset. No time-zone database: the local offset at that
/// wall-clock instant is what the store gets.
fn local_timestamp(date: &str, time: &str) -> Result<DateTime<FixedOffset>> {
    let date = parse_date(date).with_context(|| format!("unparseable date {date:?}"))?;
    let time = parse_time(time).with_context(|| format!("unparseable time {time:?}"))?;
    let naive = NaiveDateTime::new(date, time);
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("no local representation for {naive}"))?;
    Ok(local.fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventRecord;
    use crate::validation::validate;
    use pretty_assertions::assert_eq;

    #[test]
    fn patch_serializes_only_touched_fields() {
        let patch = EventPatch::new().location("Building 7");
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"location": "Building 7"}));
    }

    #[test]
    fn empty_patch_serializes_to_empty_object() {
        let patch = EventPatch::new();
        assert!(patch.is_empty());
        assert_eq!(serde_json::to_value(&patch).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn remote_event_decodes_from_store_shape() {
        let json = r#"{
            "id": "abc123",
            "summary": "Standup",
            "start": {"dateTime": "2024-01-10T10:00:00+01:00"},
            "end": {"dateTime": "2024-01-10T10:15:00+01:00"},
            "location": "Room 4",
            "htmlLink": "https://calendar.example/event/abc123"
        }"#;
        let event: RemoteEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.id, "abc123");
        assert_eq!(event.start.day().unwrap().to_string(), "2024-01-10");
        assert_eq!(event.start.clock().as_deref(), Some("10:00"));
        assert_eq!(event.html_link.as_deref(), Some("https://calendar.example/event/abc123"));
    }

    #[test]
    fn all_day_events_have_a_day_but_no_clock() {
        let json = r#"{"id": "x", "summary": "Holiday", "start": {"date": "2024-05-01"}, "end": {"date": "2024-05-02"}}"#;
        let event: RemoteEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.start.day().unwrap().to_string(), "2024-05-01");
        assert_eq!(event.start.clock(), None);
    }

    #[test]
    fn payload_from_valid_record() {
        let mut record = EventRecord::new("Review", "2024-03-05", "09:30", "2024-03-05", "10:30");
        record.description = "  ".to_string();
        record.location = "HQ".to_string();
        let payload = EventPayload::from_record(&validate(&record)).unwrap();
        assert_eq!(payload.summary, "Review");
        assert_eq!(payload.location.as_deref(), Some("HQ"));
        // Whitespace-only free text is dropped rather than sent.
        assert_eq!(payload.description, None);
        assert_eq!(payload.start.day().unwrap().to_string(), "2024-03-05");
        assert_eq!(payload.start.clock().as_deref(), Some("09:30"));
    }

    #[test]
    fn payload_from_invalid_record_is_refused() {
        let record = EventRecord::new("", "2024-03-05", "09:30", "2024-03-05", "10:30");
        assert!(EventPayload::from_record(&validate(&record)).is_err());
    }
}
