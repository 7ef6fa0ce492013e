//! Adaptive ingester (C2): turns a raw row source into durably persisted
//! `JobItem`s, sizing each `bulk_insert_items` batch off an EWMA of the
//! previous batch's latency rather than a fixed row count.
//!
//! The ingester never loses a pulled row: if a batch's serialized payload
//! would exceed `max_batch_bytes`, the excess rows are held back for the
//! next round rather than dropped.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::IngestConfig;
use crate::db::DbContext;
use crate::domain::model::{Job, JobType};
use crate::error::Result;
use tracing::warn;

const EWMA_ALPHA: f64 = 0.3;

/// Worker-local batch-size controller for one ingest run. Not shared across
/// jobs or threads.
#[derive(Debug, Clone)]
pub struct BatchSizer {
    batch_size: usize,
    min_rows: usize,
    max_rows: usize,
    max_batch_bytes: usize,
    ewma_latency_ms: f64,
    p50_target_ms: f64,
    p95_target_ms: f64,
}

impl BatchSizer {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            batch_size: config.min_rows,
            min_rows: config.min_rows,
            max_rows: config.max_rows,
            max_batch_bytes: config.max_batch_bytes,
            ewma_latency_ms: 0.0,
            p50_target_ms: config.db_p50_ms.as_secs_f64() * 1000.0,
            p95_target_ms: config.db_p95_ms.as_secs_f64() * 1000.0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn ewma_latency_ms(&self) -> f64 {
        self.ewma_latency_ms
    }

    /// Given `row_count` rows whose combined serialized size is
    /// `payload_bytes`, return how many of them fit under `max_batch_bytes`
    /// (shrinking proportionally; never below 1 when `row_count > 0`).
    pub fn clamp_for_bytes(&self, row_count: usize, payload_bytes: usize) -> usize {
        if row_count == 0 || payload_bytes <= self.max_batch_bytes {
            return row_count;
        }
        let ratio = self.max_batch_bytes as f64 / payload_bytes as f64;
        ((row_count as f64 * ratio).floor() as usize).max(1)
    }

    /// Update the latency EWMA and apply the grow/shrink/backoff signal
    /// rules for the next batch.
    ///
    /// Rule order matters: an insert error always shrinks hardest, a
    /// nonzero pool wait shrinks next, and only a clean, fast batch grows.
    pub fn record_outcome(&mut self, latency: Duration, succeeded: bool, pool_wait: Duration) {
        let sample_ms = latency.as_secs_f64() * 1000.0;
        self.ewma_latency_ms = if self.ewma_latency_ms == 0.0 {
            sample_ms
        } else {
            EWMA_ALPHA * sample_ms + (1.0 - EWMA_ALPHA) * self.ewma_latency_ms
        };

        if !succeeded {
            self.batch_size = (self.batch_size / 4).max(self.min_rows);
            return;
        }

        if pool_wait > Duration::ZERO {
            self.batch_size = (self.batch_size / 2).max(self.min_rows);
            return;
        }

        if self.ewma_latency_ms >= self.p95_target_ms {
            self.batch_size = (self.batch_size / 2).max(self.min_rows);
        } else if self.ewma_latency_ms <= self.p50_target_ms {
            self.batch_size = (self.batch_size * 2).min(self.max_rows);
        }
    }
}

/// Create a job and drain `rows` into it via adaptively sized
/// `bulk_insert_items` calls. Returns the job with `total_items` set exactly
/// to the number of rows pulled from `rows`.
///
/// The job is left in `QUEUED`; the worker flips it to `RUNNING` on its
/// first `kickoff`.
pub async fn ingest_submission(
    ctx: &DbContext,
    ingest_config: &IngestConfig,
    owner_id: &str,
    job_type: JobType,
    source_ref: Option<&str>,
    mut rows: Box<dyn Iterator<Item = Result<serde_json::Value>> + Send>,
) -> Result<Job> {
    let job = ctx.jobs().create_job(owner_id, job_type, source_ref).await?;
    let mut sizer = BatchSizer::new(ingest_config);
    let mut pending: VecDeque<serde_json::Value> = VecDeque::new();
    let mut exhausted = false;

    loop {
        let want = sizer.batch_size();

        while !exhausted && pending.len() < want {
            match rows.next() {
                Some(Ok(row)) => pending.push_back(row),
                Some(Err(err)) => return Err(err),
                None => exhausted = true,
            }
        }

        if pending.is_empty() {
            break;
        }

        let take = want.min(pending.len());
        let payload_bytes: usize = pending.iter().take(take).map(|v| v.to_string().len()).sum();
        let send_count = sizer.clamp_for_bytes(take, payload_bytes).min(take).max(1);
        let batch: Vec<serde_json::Value> = pending.drain(..send_count).collect();

        let started = Instant::now();
        let result = ctx.items().bulk_insert_items(job.id, owner_id, job_type, &batch).await;
        let elapsed = started.elapsed();

        // sqlx's pool doesn't expose acquire-wait time at the query call site,
        // so the pool-wait signal rule has no real input here; callers that
        // wrap `DbContext` with pool-wait instrumentation can call
        // `record_outcome` directly with a measured value instead.
        match result {
            Ok(_) => sizer.record_outcome(elapsed, true, Duration::ZERO),
            Err(err) => {
                warn!(job_id = job.id, error = %err, batch_size = send_count, "bulk_insert_items failed, shrinking and retrying batch");
                sizer.record_outcome(elapsed, false, Duration::ZERO);
                // A failed batch is never dropped: the rows already pulled off
                // the row source go back to the front of the queue and are
                // retried at the new, smaller batch size on the next iteration.
                for row in batch.into_iter().rev() {
                    pending.push_front(row);
                }
                continue;
            }
        }

        if pending.is_empty() && exhausted {
            break;
        }
    }

    ctx.jobs().recompute_counters(job.id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> IngestConfig {
        IngestConfig {
            min_rows: 25,
            max_rows: 2000,
            max_batch_bytes: 1_000_000,
            db_p50_ms: Duration::from_millis(50),
            db_p95_ms: Duration::from_millis(250),
        }
    }

    #[test]
    fn starts_at_min_rows() {
        let sizer = BatchSizer::new(&make_config());
        assert_eq!(sizer.batch_size(), 25);
    }

    #[test]
    fn grows_on_fast_batches() {
        let mut sizer = BatchSizer::new(&make_config());
        sizer.record_outcome(Duration::from_millis(10), true, Duration::ZERO);
        assert_eq!(sizer.batch_size(), 50);
        sizer.record_outcome(Duration::from_millis(10), true, Duration::ZERO);
        assert_eq!(sizer.batch_size(), 100);
    }

    #[test]
    fn shrinks_on_p95_breach() {
        let mut sizer = BatchSizer::new(&make_config());
        sizer.batch_size = 400;
        sizer.ewma_latency_ms = 10.0;
        sizer.record_outcome(Duration::from_millis(400), true, Duration::ZERO);
        assert!(sizer.ewma_latency_ms >= sizer.p95_target_ms);
        assert_eq!(sizer.batch_size(), 200);
    }

    #[test]
    fn holds_steady_between_p50_and_p95() {
        let mut sizer = BatchSizer::new(&make_config());
        sizer.batch_size = 100;
        sizer.record_outcome(Duration::from_millis(150), true, Duration::ZERO);
        assert_eq!(sizer.batch_size(), 100);
    }

    #[test]
    fn error_quarters_batch_size_and_floors_at_min() {
        let mut sizer = BatchSizer::new(&make_config());
        sizer.batch_size = 100;
        sizer.record_outcome(Duration::from_millis(10), false, Duration::ZERO);
        assert_eq!(sizer.batch_size(), 25);

        sizer.batch_size = 30;
        sizer.record_outcome(Duration::from_millis(10), false, Duration::ZERO);
        assert_eq!(sizer.batch_size(), 25);
    }

    #[test]
    fn nonzero_pool_wait_halves_batch_size_even_on_success() {
        let mut sizer = BatchSizer::new(&make_config());
        sizer.batch_size = 100;
        sizer.record_outcome(Duration::from_millis(10), true, Duration::from_millis(5));
        assert_eq!(sizer.batch_size(), 50);
    }

    #[test]
    fn never_exceeds_max_rows() {
        let mut sizer = BatchSizer::new(&make_config());
        sizer.batch_size = 1900;
        sizer.record_outcome(Duration::from_millis(1), true, Duration::ZERO);
        assert_eq!(sizer.batch_size(), 2000);
    }

    #[test]
    fn clamp_for_bytes_is_noop_under_the_limit() {
        let sizer = BatchSizer::new(&make_config());
        assert_eq!(sizer.clamp_for_bytes(50, 500), 50);
    }

    #[test]
    fn clamp_for_bytes_shrinks_proportionally_over_the_limit() {
        let sizer = BatchSizer::new(&make_config());
        // 2_000_000 bytes for 100 rows, limit is 1_000_000: should roughly halve.
        let kept = sizer.clamp_for_bytes(100, 2_000_000);
        assert_eq!(kept, 50);
    }

    #[test]
    fn clamp_for_bytes_never_drops_to_zero() {
        let sizer = BatchSizer::new(&make_config());
        let kept = sizer.clamp_for_bytes(1, 10_000_000);
        assert_eq!(kept, 1);
    }
}
