//! Pipeline-level tests against an in-memory calendar store.

use async_trait::async_trait;
use calsnap::batch::{BatchOptions, CancelToken};
use calsnap::event::EventRecord;
use calsnap::pipeline;
use calsnap::remote::{
    CalendarStore, EventPatch, EventPayload, EventTime, RemoteError, RemoteEvent,
};
use calsnap::state::WorkingSet;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct MockStore {
    /// Event ids (delete/patch) or summaries (insert) that must fail.
    fail: HashSet<String>,
    listing: Vec<RemoteEvent>,
    deleted: Mutex<Vec<String>>,
    patched: Mutex<Vec<String>>,
    inserted: Mutex<Vec<String>>,
}

impl MockStore {
    fn failing(ids: &[&str]) -> Self {
        Self { fail: ids.iter().map(|s| s.to_string()).collect(), ..Self::default() }
    }
}

#[async_trait]
impl CalendarStore for MockStore {
    async fn list(
        &self,
        _calendar_id: &str,
        _time_min: Option<NaiveDate>,
        _time_max: Option<NaiveDate>,
    ) -> Result<Vec<RemoteEvent>, RemoteError> {
        Ok(self.listing.clone())
    }

    async fn insert(
        &self,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> Result<RemoteEvent, RemoteError> {
        if self.fail.contains(&payload.summary) {
            return Err(RemoteError::from_status(429, "rate limited".to_string()));
        }
        self.inserted.lock().unwrap().push(payload.summary.clone());
        Ok(RemoteEvent {
            id: format!("remote-{}", payload.summary),
            calendar_id: calendar_id.to_string(),
            summary: payload.summary.clone(),
            start: payload.start.clone(),
            end: payload.end.clone(),
            ..RemoteEvent::default()
        })
    }

    async fn patch(
        &self,
        _calendar_id: &str,
        event_id: &str,
        _patch: &EventPatch,
    ) -> Result<RemoteEvent, RemoteError> {
        if self.fail.contains(event_id) {
            return Err(RemoteError::from_status(404, format!("no event {event_id}")));
        }
        self.patched.lock().unwrap().push(event_id.to_string());
        Ok(RemoteEvent { id: event_id.to_string(), ..RemoteEvent::default() })
    }

    async fn delete(&self, _calendar_id: &str, event_id: &str) -> Result<(), RemoteError> {
        if self.fail.contains(event_id) {
            return Err(RemoteError::from_status(404, format!("no event {event_id}")));
        }
        self.deleted.lock().unwrap().push(event_id.to_string());
        Ok(())
    }
}

fn fast_options() -> BatchOptions {
    BatchOptions { batch_size: 2, inter_batch_delay: Duration::ZERO }
}

fn remote(id: &str) -> RemoteEvent {
    RemoteEvent {
        id: id.to_string(),
        summary: format!("event {id}"),
        start: EventTime::all_day("2024-06-01".parse().unwrap()),
        ..RemoteEvent::default()
    }
}

fn record(subject: &str) -> EventRecord {
    EventRecord::new(subject, "2024-01-10", "10:00", "2024-01-10", "11:00")
}

#[tokio::test]
async fn bulk_delete_collects_per_item_failures_and_finishes_the_run() {
    let store = MockStore::failing(&["e3"]);
    let ids: Vec<String> = (1..=5).map(|i| format!("e{i}")).collect();

    let outcome = pipeline::bulk_delete(
        &store,
        "primary",
        ids,
        &fast_options(),
        &CancelToken::new(),
        |_, _| {},
    )
    .await
    .unwrap();

    assert_eq!(outcome.attempted, 5);
    assert_eq!(outcome.succeeded.len(), 4);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, "e3");
    // Items after the failing one were still attempted.
    assert!(store.deleted.lock().unwrap().contains(&"e5".to_string()));

    let mut cache = vec![remote("e1"), remote("e3"), remote("e5")];
    pipeline::reconcile_delete(&mut cache, &outcome);
    let remaining: Vec<&str> = cache.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(remaining, vec!["e3"]);
}

#[tokio::test]
async fn push_selected_moves_succeeded_records_out_and_keeps_failures_selected() {
    let store = MockStore::failing(&["B"]);
    let mut working = WorkingSet::new();
    working.add(record("A"));
    let b = working.add(record("B"));
    working.add(record("C"));
    working.select_all_valid();

    let outcome = pipeline::push_selected(
        &mut working,
        &store,
        "primary",
        &fast_options(),
        &CancelToken::new(),
        |_, _| {},
    )
    .await
    .unwrap();

    assert_eq!(outcome.attempted, 3);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, b);

    // A and C left the editable set; B stays, still selected for retry.
    assert_eq!(working.records().len(), 1);
    assert_eq!(working.records()[0].record.subject, "B");
    assert_eq!(working.selected_ids(), vec![b]);
    assert_eq!(*store.inserted.lock().unwrap(), vec!["A".to_string(), "C".to_string()]);
}

#[tokio::test]
async fn push_selected_refuses_invalid_records_up_front() {
    let store = MockStore::default();
    let mut working = WorkingSet::new();
    let bad = working.add(EventRecord::new("", "nope", "10:00", "2024-01-10", "11:00"));
    working.select(bad).unwrap();

    let result = pipeline::push_selected(
        &mut working,
        &store,
        "primary",
        &fast_options(),
        &CancelToken::new(),
        |_, _| {},
    )
    .await;

    assert!(result.is_err());
    assert!(store.inserted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn bulk_patch_relists_instead_of_trusting_local_state() {
    let mut store = MockStore::default();
    store.listing = vec![remote("e1"), remote("e2")];

    let (outcome, refreshed) = pipeline::bulk_patch(
        &store,
        "primary",
        vec!["e1".to_string(), "e2".to_string()],
        &EventPatch::new().location("Building 7"),
        &fast_options(),
        &CancelToken::new(),
        |_, _| {},
    )
    .await
    .unwrap();

    assert!(outcome.all_succeeded());
    assert_eq!(*store.patched.lock().unwrap(), vec!["e1".to_string(), "e2".to_string()]);
    // The reconciled view is the store's canonical answer.
    assert_eq!(refreshed.len(), 2);
    assert_eq!(refreshed[0].id, "e1");
}

#[tokio::test]
async fn bulk_patch_with_no_fields_is_rejected() {
    let store = MockStore::default();
    let result = pipeline::bulk_patch(
        &store,
        "primary",
        vec!["e1".to_string()],
        &EventPatch::new(),
        &fast_options(),
        &CancelToken::new(),
        |_, _| {},
    )
    .await;
    assert!(result.is_err());
    assert!(store.patched.lock().unwrap().is_empty());
}
