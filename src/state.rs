//! The session-local working set of extracted/edited event records.

use crate::batch::BatchOutcome;
use crate::event::{EventRecord, ValidatedEventRecord};
use crate::validation::{parse_date, parse_time, validate};
use anyhow::{anyhow, bail, Result};
use chrono::{Duration, NaiveDateTime};
use log::debug;
use std::collections::BTreeSet;

/// Records the user is currently working on, between extraction and a
/// successful push to the remote store.
///
/// Ids are assigned here on ingestion and never reused within a session.
/// Every mutation path funnels through a full re-validation and replaces the
/// stored record wholesale; the `errors` map is never patched in place.
#[derive(Debug)]
pub struct WorkingSet {
    next_id: u64,
    records: Vec<ValidatedEventRecord>,
    selected: BTreeSet<u64>,
}

impl Default for WorkingSet {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkingSet {
    pub fn new() -> Self {
        Self { next_id: 1, records: Vec::new(), selected: BTreeSet::new() }
    }

    pub fn add(&mut self, mut record: EventRecord) -> u64 {
        record.id = self.next_id;
        self.next_id += 1;
        let validated = validate(&record);
        debug!("added record {} (valid: {})", record.id, validated.is_valid);
        let id = record.id;
        self.records.push(validated);
        id
    }

    pub fn add_all(&mut self, records: impl IntoIterator<Item = EventRecord>) -> Vec<u64> {
        records.into_iter().map(|r| self.add(r)).collect()
    }

    pub fn records(&self) -> &[ValidatedEventRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&ValidatedEventRecord> {
        self.records.iter().find(|r| r.record.id == id)
    }

    /// Replace a record wholesale, re-running the full validation pass.
    pub fn replace(&mut self, id: u64, mut record: EventRecord) -> Result<()> {
        let slot = self
            .records
            .iter_mut()
            .find(|r| r.record.id == id)
            .ok_or_else(|| anyhow!("no record with id {}", id))?;
        record.id = id;
        *slot = validate(&record);
        Ok(())
    }

    /// Edit one field by its wire name, then re-validate the whole record.
    pub fn set_field(&mut self, id: u64, field: &str, value: &str) -> Result<()> {
        let current =
            self.get(id).ok_or_else(|| anyhow!("no record with id {}", id))?.record.clone();
        let mut edited = current;
        match field {
            "subject" => edited.subject = value.to_string(),
            "startDate" => edited.start_date = value.to_string(),
            "startTime" => edited.start_time = value.to_string(),
            "endDate" => edited.end_date = value.to_string(),
            "endTime" => edited.end_time = value.to_string(),
            "location" => edited.location = value.to_string(),
            "description" => edited.description = value.to_string(),
            other => bail!("unknown field {:?}", other),
        }
        self.replace(id, edited)
    }

    /// Apply one field value to every selected record. Each record goes
    /// through its own full re-validation.
    pub fn apply_to_selected(&mut self, field: &str, value: &str) -> Result<usize> {
        let ids: Vec<u64> = self.selected.iter().copied().collect();
        for id in &ids {
            self.set_field(*id, field, value)?;
        }
        Ok(ids.len())
    }

    /// Recompute the end date/time as start plus a duration.
    pub fn set_duration(&mut self, id: u64, minutes: i64) -> Result<()> {
        if minutes <= 0 {
            bail!("duration must be positive");
        }
        let current =
            self.get(id).ok_or_else(|| anyhow!("no record with id {}", id))?.record.clone();
        let start_date = parse_date(&current.start_date)
            .ok_or_else(|| anyhow!("record {} has no parseable start date", id))?;
        let start_time = parse_time(&current.start_time)
            .ok_or_else(|| anyhow!("record {} has no parseable start time", id))?;
        let end = NaiveDateTime::new(start_date, start_time) + Duration::minutes(minutes);
        let mut edited = current;
        edited.end_date = end.format("%Y-%m-%d").to_string();
        edited.end_time = end.format("%H:%M").to_string();
        self.replace(id, edited)
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.record.id != id);
        self.selected.remove(&id);
        self.records.len() != before
    }

    pub fn select(&mut self, id: u64) -> Result<()> {
        if self.get(id).is_none() {
            bail!("no record with id {}", id);
        }
        self.selected.insert(id);
        Ok(())
    }

    pub fn deselect(&mut self, id: u64) {
        self.selected.remove(&id);
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Select every record that currently passes validation.
    pub fn select_all_valid(&mut self) -> usize {
        self.selected =
            self.records.iter().filter(|r| r.is_valid).map(|r| r.record.id).collect();
        self.selected.len()
    }

    pub fn selected_ids(&self) -> Vec<u64> {
        self.selected.iter().copied().collect()
    }

    pub fn is_selected(&self, id: u64) -> bool {
        self.selected.contains(&id)
    }

    /// Reconcile after a bulk insert run: records that made it to the remote
    /// store leave the local editable set; failed ones stay selected so the
    /// user can retry exactly that subset.
    pub fn reconcile_insert(&mut self, outcome: &BatchOutcome<u64>) {
        for id in &outcome.succeeded {
            self.remove(*id);
        }
        self.selected = outcome.failed.iter().map(|(id, _)| *id).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(subject: &str) -> EventRecord {
        EventRecord::new(subject, "2024-01-10", "10:00", "2024-01-10", "11:00")
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut set = WorkingSet::new();
        let a = set.add(record("A"));
        let b = set.add(record("B"));
        assert!(set.remove(b));
        let c = set.add(record("C"));
        assert!(a < b && b < c, "{a} {b} {c}");
    }

    #[test]
    fn add_validates_on_ingestion() {
        let mut set = WorkingSet::new();
        let id = set.add(EventRecord::new("", "nope", "10:00", "2024-01-10", "11:00"));
        let stored = set.get(id).unwrap();
        assert!(!stored.is_valid);
        assert!(stored.errors.contains_key("subject"));
        assert!(stored.errors.contains_key("startDate"));
    }

    #[test]
    fn single_field_edit_revalidates_the_whole_record() {
        let mut set = WorkingSet::new();
        let id = set.add(record("A"));
        // Move the start past the end: the untouched end field goes invalid.
        set.set_field(id, "startTime", "12:00").unwrap();
        let stored = set.get(id).unwrap();
        assert!(!stored.is_valid);
        assert_eq!(stored.errors.get("endTime").map(String::as_str), Some("must be after start"));
        // And editing the end back fixes it without any manual error patching.
        set.set_field(id, "endTime", "13:00").unwrap();
        assert!(set.get(id).unwrap().is_valid);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let mut set = WorkingSet::new();
        let id = set.add(record("A"));
        assert!(set.set_field(id, "color", "red").is_err());
    }

    #[test]
    fn duration_recomputes_end_across_midnight() {
        let mut set = WorkingSet::new();
        let id = set.add(EventRecord::new("Late", "2024-01-10", "23:30", "", ""));
        set.set_duration(id, 60).unwrap();
        let stored = set.get(id).unwrap();
        assert_eq!(stored.record.end_date, "2024-01-11");
        assert_eq!(stored.record.end_time, "00:30");
        assert!(stored.is_valid);
    }

    #[test]
    fn bulk_apply_hits_only_selected_records() {
        let mut set = WorkingSet::new();
        let a = set.add(record("A"));
        let b = set.add(record("B"));
        set.select(a).unwrap();
        let changed = set.apply_to_selected("location", "Offsite").unwrap();
        assert_eq!(changed, 1);
        assert_eq!(set.get(a).unwrap().record.location, "Offsite");
        assert_eq!(set.get(b).unwrap().record.location, "");
    }

    #[test]
    fn select_all_valid_skips_broken_records() {
        let mut set = WorkingSet::new();
        let good = set.add(record("A"));
        let bad = set.add(EventRecord::new("", "x", "y", "z", "w"));
        assert_eq!(set.select_all_valid(), 1);
        assert!(set.is_selected(good));
        assert!(!set.is_selected(bad));
    }

    #[test]
    fn insert_reconciliation_drops_succeeded_and_keeps_failed_selected() {
        let mut set = WorkingSet::new();
        let a = set.add(record("A"));
        let b = set.add(record("B"));
        let c = set.add(record("C"));
        set.select_all_valid();

        let outcome = BatchOutcome {
            attempted: 3,
            succeeded: vec![a, c],
            failed: vec![(b, "quota".to_string())],
            cancelled: false,
        };
        set.reconcile_insert(&outcome);

        assert!(set.get(a).is_none());
        assert!(set.get(c).is_none());
        assert!(set.get(b).is_some());
        assert_eq!(set.selected_ids(), vec![b]);
    }
}
