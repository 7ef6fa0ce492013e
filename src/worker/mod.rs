//! Time-sliced worker (C4): claim eligible items, dispatch each through the
//! pricing state machine (C5) with bounded concurrency, checkpoint results,
//! and return before the slice deadline.
//!
//! The worker is invoked, not self-scheduling: `kickoff` runs exactly one
//! slice to completion and returns its summary. There is no background loop
//! driving this module; an external caller (an HTTP handler, a scheduler)
//! decides when the next slice happens.

pub mod claim_size;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};
use ts_rs::TS;

use crate::adapters::{AuditSink, DescriptorExtractor, SearchProvider};
use crate::config::{PolicyConfig, WorkerConfig};
use crate::control::RetryController;
use crate::db::{CheckpointOutcome, DbContext};
use crate::domain::model::{JobItem, JobItemStatus, QueueState};
use crate::error::Result;
use crate::pricing;
use crate::worker::claim_size::ItemTimer;

/// Summary of one `kickoff` slice, returned to the caller.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SliceSummary {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

/// The dependencies C5 needs to resolve an item, bundled so callers don't
/// thread six separate `Arc`s through `kickoff`.
#[derive(Clone)]
pub struct PricingDeps {
    pub search_provider: Arc<dyn SearchProvider>,
    pub descriptor_extractor: Arc<dyn DescriptorExtractor>,
    pub audit_sink: Arc<dyn AuditSink>,
    pub retry: Arc<RetryController>,
    pub policy: PolicyConfig,
    /// Copied from `WorkerConfig` at wiring time so C5 can consult the same
    /// retry caps the worker was configured with, without threading a second
    /// config object through every call.
    pub max_attempts_error: i32,
    pub max_attempts_not_found: i32,
}

enum ProcessOutcome {
    Done,
    Failed,
    /// Checkpoint was rejected because the lock was stolen; not an error,
    /// the rightful owner will re-drive this item on its own slice.
    StaleLock,
}

/// Run exactly one slice for `job_id`: claim eligible items, dispatch each
/// through the pricing pipeline with up to `deps.retry`'s concurrency bound,
/// checkpoint results, and stop issuing new work as the slice deadline
/// approaches (in-flight items still run to completion or their own
/// per-item deadline).
pub async fn kickoff(
    ctx: &DbContext,
    deps: &PricingDeps,
    worker_config: &WorkerConfig,
    worker_id: &str,
    job_id: i64,
    slice_ms: u64,
) -> Result<SliceSummary> {
    let slice_started = Instant::now();
    let slice_deadline = slice_started + Duration::from_millis(slice_ms);

    let job = ctx
        .jobs()
        .get_job(job_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("job {job_id} not found"))?;

    if matches!(
        job.queue_state,
        QueueState::Paused | QueueState::Done | QueueState::Failed
    ) {
        return Ok(empty_summary(slice_started));
    }

    let mut timer = ItemTimer::new();
    let concurrency = deps.retry.concurrency_limit().max(1);
    let mut join_set: JoinSet<Result<(i64, ProcessOutcome, Duration)>> = JoinSet::new();
    let mut remaining: VecDeque<JobItem> = VecDeque::new();
    let mut claimed_count = 0usize;
    let mut completed = 0usize;
    let mut failed = 0usize;
    let mut transitioned = false;

    loop {
        // Top up the local work queue using the timer's current estimate.
        // Early rounds claim at `claim_min` (the timer is still cold); once
        // items in this slice have completed, `claim_size`/`lock_ttl` track
        // the observed per-item latency for every subsequent round.
        if remaining.is_empty() && Instant::now() < slice_deadline {
            let claim_size = timer.claim_size(worker_config);
            let lock_ttl = timer.lock_ttl(worker_config);
            let more = ctx
                .items()
                .claim_items(job_id, worker_id, claim_size as i64, lock_ttl)
                .await?;
            if !more.is_empty() {
                claimed_count += more.len();
                remaining.extend(more);
                if !transitioned && job.queue_state == QueueState::Queued {
                    ctx.jobs().transition(job_id, QueueState::Running).await?;
                    transitioned = true;
                }
            }
        }

        while join_set.len() < concurrency && Instant::now() < slice_deadline {
            let Some(item) = remaining.pop_front() else {
                break;
            };
            let ctx = ctx.clone();
            let deps = deps.clone();
            let worker_id = worker_id.to_string();
            join_set.spawn(async move {
                let started = Instant::now();
                let outcome = process_item(&ctx, &deps, &worker_id, item, slice_deadline).await?;
                Ok((outcome.0, outcome.1, started.elapsed()))
            });
        }

        if join_set.is_empty() && remaining.is_empty() {
            break;
        }

        let remaining_time = slice_deadline.saturating_duration_since(Instant::now());
        let next = if remaining_time.is_zero() {
            join_set.join_next().await
        } else {
            tokio::time::timeout(remaining_time, join_set.join_next())
                .await
                .unwrap_or(None)
        };

        match next {
            Some(Ok(Ok((_, outcome, elapsed)))) => {
                timer.record(elapsed);
                match outcome {
                    ProcessOutcome::Done => completed += 1,
                    ProcessOutcome::Failed => failed += 1,
                    ProcessOutcome::StaleLock => {}
                }
            }
            Some(Ok(Err(err))) => {
                warn!(error = %err, job_id, "item processing failed unexpectedly");
                failed += 1;
            }
            Some(Err(join_err)) => {
                warn!(error = %join_err, job_id, "item task panicked");
                failed += 1;
            }
            None => {
                if Instant::now() >= slice_deadline {
                    break;
                }
            }
        }
    }

    // Items claimed but never dispatched before the deadline: release their
    // lock so the next slice (by this or another worker) can claim them.
    for item in remaining {
        if let Err(err) = ctx.items().release_lock(item.id, worker_id).await {
            warn!(error = %err, item_id = item.id, "failed to release unstarted item lock");
        }
    }

    ctx.jobs().heartbeat(job_id).await?;
    let job = ctx.jobs().recompute_counters(job_id).await?;
    info!(
        job_id,
        claimed = claimed_count,
        completed,
        failed,
        queue_state = ?job.queue_state,
        "slice complete"
    );

    Ok(SliceSummary {
        claimed: claimed_count,
        completed,
        failed,
        elapsed_ms: slice_started.elapsed().as_millis() as u64,
    })
}

fn empty_summary(slice_started: Instant) -> SliceSummary {
    SliceSummary {
        claimed: 0,
        completed: 0,
        failed: 0,
        elapsed_ms: slice_started.elapsed().as_millis() as u64,
    }
}

/// Run one item through the C5 pricing pipeline and checkpoint the result.
/// Every path through `pricing::resolve` produces a terminal label, so this
/// only returns `Err` for a failure in the checkpoint write itself.
async fn process_item(
    ctx: &DbContext,
    deps: &PricingDeps,
    worker_id: &str,
    item: JobItem,
    deadline: Instant,
) -> Result<(i64, ProcessOutcome)> {
    let resolution = pricing::resolve(ctx, deps, &item, deadline).await;

    let (status, normalized_json, result_json, error) = match resolution {
        Ok(r) => (r.status, r.normalized_json, r.result_json, r.error),
        Err(err) => (JobItemStatus::Error, None, None, Some(err.to_string())),
    };

    let checkpoint = ctx
        .items()
        .checkpoint_item(
            item.id,
            item.job_id,
            worker_id,
            status,
            normalized_json.as_ref(),
            result_json.as_ref(),
            error.as_deref(),
        )
        .await?;

    let outcome = match checkpoint {
        CheckpointOutcome::StaleLock => ProcessOutcome::StaleLock,
        CheckpointOutcome::Applied if matches!(status, JobItemStatus::Done) => ProcessOutcome::Done,
        CheckpointOutcome::Applied => ProcessOutcome::Failed,
    };

    Ok((item.id, outcome))
}
