//! Orchestration: extract → validate → mutate.
//
// Thin by design. The pieces it wires together (extractor, validator,
// batch engine, store client) own all the real invariants.

use crate::batch::{run_batched, BatchOptions, BatchOutcome, CancelToken};
use crate::extractor;
use crate::llm::{self, Attachment};
use crate::remote::{CalendarStore, EventPatch, EventPayload, RemoteEvent};
use crate::state::WorkingSet;
use anyhow::{anyhow, bail, Result};
use log::info;
use std::collections::HashMap;

/// Ask the model to read `text` and/or `attachment`, recover the event
/// array from its response and ingest everything into the working set.
/// Returns the assigned local ids; invalid records are ingested too, with
/// their errors attached, so the user can fix them up.
pub async fn import_from_model(
    working: &mut WorkingSet,
    text: Option<&str>,
    attachment: Option<&Attachment>,
) -> Result<Vec<u64>> {
    let response = llm::request_event_extraction(text, attachment).await?;
    let records = extractor::extract(&response.raw_text, response.strict_schema)?;
    info!("extracted {} event(s) from model response", records.len());
    Ok(working.add_all(records))
}

/// Insert every selected record into the remote store in paced batches,
/// then reconcile: succeeded records leave the working set, failed ones
/// stay selected for an immediate retry of exactly that subset.
pub async fn push_selected(
    working: &mut WorkingSet,
    store: &dyn CalendarStore,
    calendar_id: &str,
    options: &BatchOptions,
    cancel: &CancelToken,
    on_progress: impl FnMut(usize, usize),
) -> Result<BatchOutcome<u64>> {
    let mut payloads = HashMap::new();
    let mut targets = Vec::new();
    for id in working.selected_ids() {
        let validated = working.get(id).ok_or_else(|| anyhow!("no record with id {}", id))?;
        if !validated.is_valid {
            bail!("record {} is not valid: {}", id, validated.error_summary());
        }
        payloads.insert(id, EventPayload::from_record(validated)?);
        targets.push(id);
    }

    let outcome = run_batched(
        targets,
        |id| {
            let payload = payloads.get(&id).cloned();
            async move {
                let payload = payload.ok_or_else(|| anyhow!("no payload for target {}", id))?;
                store.insert(calendar_id, &payload).await?;
                Ok(())
            }
        },
        options,
        cancel,
        on_progress,
    )
    .await?;

    working.reconcile_insert(&outcome);
    Ok(outcome)
}

/// Delete the given remote events in paced batches.
pub async fn bulk_delete(
    store: &dyn CalendarStore,
    calendar_id: &str,
    event_ids: Vec<String>,
    options: &BatchOptions,
    cancel: &CancelToken,
    on_progress: impl FnMut(usize, usize),
) -> Result<BatchOutcome<String>> {
    run_batched(
        event_ids,
        |id| async move {
            store.delete(calendar_id, &id).await?;
            Ok(())
        },
        options,
        cancel,
        on_progress,
    )
    .await
}

/// Apply one partial update to many remote events, then re-query the store.
///
/// Reconciliation after a patch is a full re-list on purpose: derived fields
/// on the remote copy depend on the store's canonical state, not on whatever
/// we had cached locally.
pub async fn bulk_patch(
    store: &dyn CalendarStore,
    calendar_id: &str,
    event_ids: Vec<String>,
    patch: &EventPatch,
    options: &BatchOptions,
    cancel: &CancelToken,
    on_progress: impl FnMut(usize, usize),
) -> Result<(BatchOutcome<String>, Vec<RemoteEvent>)> {
    if patch.is_empty() {
        bail!("patch contains no fields to apply");
    }
    let outcome = run_batched(
        event_ids,
        |id| async move {
            store.patch(calendar_id, &id, patch).await?;
            Ok(())
        },
        options,
        cancel,
        on_progress,
    )
    .await?;

    let refreshed = store.list(calendar_id, None, None).await?;
    Ok((outcome, refreshed))
}

/// Drop successfully deleted events from the local cache; failures stay so
/// the user can retry just those.
pub fn reconcile_delete(cache: &mut Vec<RemoteEvent>, outcome: &BatchOutcome<String>) {
    cache.retain(|event| !outcome.succeeded.contains(&event.id));
}
