//! Generic batched mutation engine.
//
// Applies an arbitrary async per-item operation over a collection of targets
// in bounded-size waves, pacing between waves to stay under the remote
// store's rate limits, with per-item outcome capture. A single item's
// failure never aborts its siblings or any later wave: settle-all, never
// short-circuit.

use anyhow::{bail, Result};
use futures::future::join_all;
use log::{debug, info};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Cooperative cancellation for an in-flight batch run. Checked between
/// chunks only; operations already in flight are left to settle.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Chunking and pacing knobs for [`run_batched`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum number of concurrently in-flight operations per chunk.
    pub batch_size: usize,
    /// Pause between consecutive chunks. Pure rate-limit pacing, zero is fine.
    pub inter_batch_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { batch_size: 10, inter_batch_delay: Duration::from_millis(500) }
    }
}

/// Aggregate result of one mutation run.
#[derive(Debug, Default)]
pub struct BatchOutcome<T> {
    /// Total items attempted (equals the target count unless cancelled).
    pub attempted: usize,
    pub succeeded: Vec<T>,
    pub failed: Vec<(T, String)>,
    /// True when the run was cancelled between chunks before finishing.
    pub cancelled: bool,
}

impl<T> BatchOutcome<T> {
    fn empty() -> Self {
        Self { attempted: 0, succeeded: Vec::new(), failed: Vec::new(), cancelled: false }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    /// Human-readable summary for a run with failures, e.g.
    /// "2 of 12 items did not complete".
    pub fn failure_summary(&self) -> Option<String> {
        if self.failed.is_empty() {
            None
        } else {
            Some(format!("{} of {} items did not complete", self.failed.len(), self.attempted))
        }
    }
}

/// Run `operation` over every target in consecutive chunks of at most
/// `options.batch_size`, concurrently within a chunk, sequentially across
/// chunks, sleeping `options.inter_batch_delay` between chunks.
///
/// Individual operation failures are captured in the outcome, never
/// re-thrown; the returned `Err` is reserved for engine misconfiguration.
/// Progress is reported after each chunk settles as cumulative
/// `(done, total)`. The cancel token is consulted between chunks; a
/// cancelled run returns the partial outcome with `cancelled` set.
pub async fn run_batched<T, R, Op, Fut, P>(
    targets: Vec<T>,
    operation: Op,
    options: &BatchOptions,
    cancel: &CancelToken,
    mut on_progress: P,
) -> Result<BatchOutcome<T>>
where
    T: Clone,
    Op: Fn(T) -> Fut,
    Fut: Future<Output = Result<R>>,
    P: FnMut(usize, usize),
{
    if options.batch_size == 0 {
        bail!("batch size must be at least 1");
    }
    if targets.is_empty() {
        return Ok(BatchOutcome::empty());
    }

    let total = targets.len();
    let chunk_count = total.div_ceil(options.batch_size);
    let mut outcome = BatchOutcome::empty();

    for (index, chunk) in targets.chunks(options.batch_size).enumerate() {
        if cancel.is_cancelled() {
            info!("batch run cancelled after {} of {} items", outcome.attempted, total);
            outcome.cancelled = true;
            return Ok(outcome);
        }

        debug!("batch chunk {}/{} ({} items)", index + 1, chunk_count, chunk.len());
        let settled = join_all(chunk.iter().cloned().map(|target| {
            let fut = operation(target.clone());
            async move { (target, fut.await) }
        }))
        .await;

        for (target, result) in settled {
            match result {
                Ok(_) => outcome.succeeded.push(target),
                Err(err) => outcome.failed.push((target, format!("{err:#}"))),
            }
        }
        outcome.attempted += chunk.len();
        on_progress(outcome.attempted, total);

        if index + 1 < chunk_count {
            sleep(options.inter_batch_delay).await;
        }
    }

    Ok(outcome)
}
