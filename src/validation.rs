//! Validation and normalization for calendar event records.
//
// One entry point: `validate`. Pure, deterministic, no I/O. Invalid input is
// data in the output, never an error.

use crate::event::{EventRecord, ValidatedEventRecord};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;

/// Accepted textual date conventions. Year-first is the canonical form;
/// day-first variants arrive from locale-formatted producers. A 4-digit
/// leading token can only match the ISO format, so the conventions never
/// collide on the same string.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

const TIME_FORMAT: &str = "%H:%M";

/// Parse a date in any accepted convention.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS.iter().find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// Parse a 24-hour `HH:MM` time.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT).ok()
}

/// Validate a record, producing a fresh verdict over every field.
///
/// Parseable date fields are canonicalized to ISO `YYYY-MM-DD` in the
/// returned record, so everything downstream (export, remote payloads) sees
/// one internal representation regardless of which convention the producer
/// used. Unparseable fields are left as entered so the user can see and fix
/// their input.
///
/// The cross-field start-before-end rule runs only once all four date/time
/// fields individually parsed, so an unrelated format error never cascades
/// into a bogus ordering error.
pub fn validate(record: &EventRecord) -> ValidatedEventRecord {
    let mut errors = BTreeMap::new();
    let mut normalized = record.clone();

    if record.subject.trim().is_empty() {
        errors.insert("subject".to_string(), "subject required".to_string());
    }

    let start_date = check_date(&record.start_date, "startDate", &mut errors);
    let end_date = check_date(&record.end_date, "endDate", &mut errors);
    let start_time = check_time(&record.start_time, "startTime", &mut errors);
    let end_time = check_time(&record.end_time, "endTime", &mut errors);

    if let Some(d) = start_date {
        normalized.start_date = d.format("%Y-%m-%d").to_string();
    }
    if let Some(d) = end_date {
        normalized.end_date = d.format("%Y-%m-%d").to_string();
    }

    if let (Some(sd), Some(st), Some(ed), Some(et)) = (start_date, start_time, end_date, end_time) {
        let start = NaiveDateTime::new(sd, st);
        let end = NaiveDateTime::new(ed, et);
        if start >= end {
            // Blame the end side: the date field when the whole day is off,
            // the time field when only the time of day is.
            let field = if ed < sd { "endDate" } else { "endTime" };
            errors.insert(field.to_string(), "must be after start".to_string());
        }
    }

    let is_valid = errors.is_empty();
    ValidatedEventRecord { record: normalized, errors, is_valid }
}

fn check_date(value: &str, field: &str, errors: &mut BTreeMap<String, String>) -> Option<NaiveDate> {
    match parse_date(value) {
        Some(d) => Some(d),
        None => {
            errors.insert(
                field.to_string(),
                format!("{} is not a valid date (expected YYYY-MM-DD or DD/MM/YYYY)", field),
            );
            None
        }
    }
}

fn check_time(value: &str, field: &str, errors: &mut BTreeMap<String, String>) -> Option<NaiveTime> {
    match parse_time(value) {
        Some(t) => Some(t),
        None => {
            errors.insert(
                field.to_string(),
                format!("{} is not a valid 24-hour time (expected HH:MM)", field),
            );
            None
        }
    }
}
