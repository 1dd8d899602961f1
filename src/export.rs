//! CSV and ICS export of validated event records.

use crate::event::ValidatedEventRecord;
use crate::validation::{parse_date, parse_time};
use anyhow::{Context, Result};
use chrono::Utc;
use log::warn;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

/// Fixed column order for the delimited export.
const CSV_HEADER: [&str; 7] =
    ["Subject", "Start Date", "Start Time", "End Date", "End Time", "Description", "Location"];

/// Write records as CSV. Quoting (embedded delimiters, quotes, line breaks)
/// is the csv writer's job.
pub fn write_csv<W: Write>(records: &[ValidatedEventRecord], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;
    for validated in records {
        let r = &validated.record;
        csv.write_record([
            &r.subject,
            &r.start_date,
            &r.start_time,
            &r.end_date,
            &r.end_time,
            &r.description,
            &r.location,
        ])?;
    }
    csv.flush()?;
    Ok(())
}

pub fn export_csv(records: &[ValidatedEventRecord], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("could not create {}", path.display()))?;
    write_csv(records, file)
}

/// Render records as a VCALENDAR. Start/end are written as floating local
/// time with no UTC offset. Records that fail validation are skipped with a
/// warning rather than producing a broken block.
pub fn render_ics(records: &[ValidatedEventRecord]) -> String {
    let mut out = String::new();
    push_line(&mut out, "BEGIN:VCALENDAR");
    push_line(&mut out, "VERSION:2.0");
    push_line(&mut out, "PRODID:-//CalSnap//CalSnap 0.1//EN");
    push_line(&mut out, "CALSCALE:GREGORIAN");

    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    for validated in records {
        let r = &validated.record;
        let parsed = (
            parse_date(&r.start_date),
            parse_time(&r.start_time),
            parse_date(&r.end_date),
            parse_time(&r.end_time),
        );
        let (Some(sd), Some(st), Some(ed), Some(et)) = parsed else {
            warn!("skipping record {} in ICS export: not exportable", r.id);
            continue;
        };

        push_line(&mut out, "BEGIN:VEVENT");
        push_line(&mut out, &format!("UID:{}@calsnap", Uuid::new_v4()));
        push_line(&mut out, &format!("DTSTAMP:{}", stamp));
        push_line(&mut out, &format!("DTSTART:{}T{}00", sd.format("%Y%m%d"), st.format("%H%M")));
        push_line(&mut out, &format!("DTEND:{}T{}00", ed.format("%Y%m%d"), et.format("%H%M")));
        push_line(&mut out, &format!("SUMMARY:{}", escape_ics_text(&r.subject)));
        if !r.location.is_empty() {
            push_line(&mut out, &format!("LOCATION:{}", escape_ics_text(&r.location)));
        }
        if !r.description.is_empty() {
            push_line(&mut out, &format!("DESCRIPTION:{}", escape_ics_text(&r.description)));
        }
        push_line(&mut out, "END:VEVENT");
    }

    push_line(&mut out, "END:VCALENDAR");
    out
}

pub fn export_ics(records: &[ValidatedEventRecord], path: &Path) -> Result<()> {
    std::fs::write(path, render_ics(records))
        .with_context(|| format!("could not write {}", path.display()))
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push_str("\r\n");
}

/// RFC 5545 text escaping: backslash, semicolon and comma get a backslash;
/// literal line breaks become an escaped `n`.
fn escape_ics_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventRecord;
    use crate::validation::validate;
    use pretty_assertions::assert_eq;

    fn validated(subject: &str) -> ValidatedEventRecord {
        let mut r = EventRecord::new(subject, "2024-01-10", "10:00", "2024-01-10", "11:00");
        r.location = "Room 4".to_string();
        validate(&r)
    }

    #[test]
    fn csv_has_the_fixed_header_order() {
        let mut buf = Vec::new();
        write_csv(&[validated("Sync")], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Subject,Start Date,Start Time,End Date,End Time,Description,Location"
        );
        assert_eq!(lines.next().unwrap(), "Sync,2024-01-10,10:00,2024-01-10,11:00,,Room 4");
    }

    #[test]
    fn csv_quotes_delimiters_and_doubles_embedded_quotes() {
        let mut record = EventRecord::new("Lunch, \"offsite\"", "2024-01-10", "12:00", "2024-01-10", "13:00");
        record.description = "line one\nline two".to_string();
        let mut buf = Vec::new();
        write_csv(&[validate(&record)], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\"Lunch, \"\"offsite\"\"\""));
        assert!(text.contains("\"line one\nline two\""));
    }

    #[test]
    fn ics_emits_floating_local_times() {
        let ics = render_ics(&[validated("Sync")]);
        assert!(ics.contains("BEGIN:VCALENDAR\r\n"));
        assert!(ics.contains("DTSTART:20240110T100000\r\n"));
        assert!(ics.contains("DTEND:20240110T110000\r\n"));
        // Floating means no zulu suffix and no offset on start/end.
        assert!(!ics.contains("DTSTART:20240110T100000Z"));
        assert!(ics.contains("SUMMARY:Sync\r\n"));
        assert!(ics.contains("END:VCALENDAR\r\n"));
    }

    #[test]
    fn ics_blocks_carry_uid_and_dtstamp() {
        let ics = render_ics(&[validated("A"), validated("B")]);
        let uids: Vec<&str> = ics.lines().filter(|l| l.starts_with("UID:")).collect();
        assert_eq!(uids.len(), 2);
        assert_ne!(uids[0], uids[1]);
        assert_eq!(ics.lines().filter(|l| l.starts_with("DTSTAMP:")).count(), 2);
    }

    #[test]
    fn ics_escapes_text_fields() {
        let mut record = EventRecord::new("Plan; phase 1, v2\\final", "2024-01-10", "10:00", "2024-01-10", "11:00");
        record.description = "first\nsecond".to_string();
        let ics = render_ics(&[validate(&record)]);
        assert!(ics.contains("SUMMARY:Plan\\; phase 1\\, v2\\\\final\r\n"));
        assert!(ics.contains("DESCRIPTION:first\\nsecond\r\n"));
    }

    #[test]
    fn unexportable_records_are_skipped() {
        let broken = validate(&EventRecord::new("X", "someday", "10:00", "2024-01-10", "11:00"));
        let ics = render_ics(&[broken, validated("Good")]);
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);
        assert!(ics.contains("SUMMARY:Good\r\n"));
    }
}
