//! Job item operations: bulk ingest, claim/checkpoint, keyset listing, reprocess.

use crate::db::DbContext;
use crate::domain::Cursor;
use crate::domain::model::{JobItem, JobItemStatus, JobItemSummary, JobType};
use crate::error::Result;
use crate::events::{DomainEvent, ItemEvent};

pub struct JobItemOps<'a> {
    ctx: &'a DbContext,
}

fn job_type_text(job_type: JobType) -> &'static str {
    match job_type {
        JobType::Csv => "CSV",
        JobType::Image => "IMAGE",
        JobType::Single => "SINGLE",
    }
}

fn status_text(status: JobItemStatus) -> &'static str {
    match status {
        JobItemStatus::Pending => "PENDING",
        JobItemStatus::Processing => "PROCESSING",
        JobItemStatus::Done => "DONE",
        JobItemStatus::Error => "ERROR",
        JobItemStatus::NotFound => "NOT_FOUND",
        JobItemStatus::Skipped => "SKIPPED",
    }
}

/// Result of a `checkpoint_item` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// The update applied; the caller still held the lock.
    Applied,
    /// No row matched `id AND locked_by = worker_id`: the lock expired and was
    /// stolen by another worker before this checkpoint landed. The caller's
    /// work is discarded; it must not retry the write.
    StaleLock,
}

/// Which items a reprocess request targets.
#[derive(Debug, Clone)]
pub enum ReprocessScope {
    All,
    ErrorsOnly,
    NotFoundOnly,
    Ids(Vec<i64>),
}

/// One page of a keyset-paginated item listing.
#[derive(Debug, Clone)]
pub struct ListItemsPage {
    pub items: Vec<JobItemSummary>,
    pub next_cursor: Option<String>,
}

impl<'a> JobItemOps<'a> {
    pub(crate) fn new(ctx: &'a DbContext) -> Self {
        Self { ctx }
    }

    /// Bulk insert items for a job using `UNNEST` for a single round trip, and
    /// bump the job's `total_items` to match.
    pub async fn bulk_insert_items(
        &self,
        job_id: i64,
        owner_id: &str,
        job_type: JobType,
        inputs: &[serde_json::Value],
    ) -> Result<Vec<JobItem>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let job_type_str = job_type_text(job_type);

        let job_ids = vec![job_id; inputs.len()];
        let owner_ids = vec![owner_id.to_string(); inputs.len()];
        let job_types: Vec<&str> = vec![job_type_str; inputs.len()];

        let inserted = sqlx::query_as::<_, JobItem>(
            r#"
            INSERT INTO job_items (job_id, owner_id, job_type, status, input_json)
            SELECT v.job_id, v.owner_id, v.job_type, 'PENDING', v.input_json
            FROM UNNEST($1::bigint[], $2::text[], $3::text[], $4::jsonb[])
                AS v(job_id, owner_id, job_type, input_json)
            RETURNING *
            "#,
        )
        .bind(&job_ids)
        .bind(&owner_ids)
        .bind(&job_types)
        .bind(inputs)
        .fetch_all(self.ctx.pool())
        .await?;

        sqlx::query("UPDATE jobs SET total_items = total_items + $2, updated_at = NOW() WHERE id = $1")
            .bind(job_id)
            .bind(inserted.len() as i32)
            .execute(self.ctx.pool())
            .await?;

        Ok(inserted)
    }

    /// Atomically claim up to `limit` eligible items for `worker_id`.
    ///
    /// Eligible items are `PENDING`, or `PROCESSING` with a lock older than
    /// `lock_ttl` (the previous worker is presumed dead). Uses
    /// `FOR UPDATE SKIP LOCKED` so concurrent workers never contend on the
    /// same rows.
    pub async fn claim_items(
        &self,
        job_id: i64,
        worker_id: &str,
        limit: i64,
        lock_ttl: std::time::Duration,
    ) -> Result<Vec<JobItem>> {
        let mut tx = self.ctx.pool().begin().await?;

        let ttl_secs = lock_ttl.as_secs_f64();
        let claimed = sqlx::query_as::<_, JobItem>(
            r#"
            SELECT * FROM job_items
            WHERE job_id = $1
              AND (
                  status = 'PENDING'
                  OR (status = 'PROCESSING' AND locked_at < NOW() - make_interval(secs => $2::double precision))
              )
            ORDER BY updated_at ASC, id ASC
            LIMIT $3
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(job_id)
        .bind(ttl_secs)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        if claimed.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = claimed.iter().map(|i| i.id).collect();
        sqlx::query(
            "UPDATE job_items SET status = 'PROCESSING', locked_by = $2, locked_at = NOW(), updated_at = NOW() \
             WHERE id = ANY($1)",
        )
        .bind(&ids)
        .bind(worker_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        for id in &ids {
            self.ctx.events().publish(DomainEvent::Item(ItemEvent::Claimed {
                id: *id,
                job_id,
                worker_id: worker_id.to_string(),
            }));
        }

        Ok(claimed)
    }

    /// Write the outcome of processing one item, but only if `worker_id` still
    /// holds its lock. Returns [`CheckpointOutcome::StaleLock`] instead of
    /// applying the write if the lock was stolen in the meantime.
    #[allow(clippy::too_many_arguments)]
    pub async fn checkpoint_item(
        &self,
        item_id: i64,
        job_id: i64,
        worker_id: &str,
        status: JobItemStatus,
        normalized_json: Option<&serde_json::Value>,
        result_json: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<CheckpointOutcome> {
        let bump_attempts = matches!(status, JobItemStatus::Error | JobItemStatus::NotFound);

        let result = sqlx::query(
            r#"
            UPDATE job_items SET
                status = $4,
                normalized_json = COALESCE($5, normalized_json),
                result_json = COALESCE($6, result_json),
                last_error = $7,
                attempts = attempts + CASE WHEN $8 THEN 1 ELSE 0 END,
                locked_by = NULL,
                locked_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND job_id = $2 AND locked_by = $3
            "#,
        )
        .bind(item_id)
        .bind(job_id)
        .bind(worker_id)
        .bind(status)
        .bind(normalized_json)
        .bind(result_json)
        .bind(error)
        .bind(bump_attempts)
        .execute(self.ctx.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(CheckpointOutcome::StaleLock);
        }

        let event = match status {
            JobItemStatus::Done => {
                let match_quality = result_json
                    .and_then(|v| v.get("match_quality"))
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or(crate::domain::model::MatchQuality::None);
                ItemEvent::Resolved { id: item_id, job_id, match_quality }
            }
            JobItemStatus::Error | JobItemStatus::NotFound => ItemEvent::Failed {
                id: item_id,
                job_id,
                status,
            },
            _ => ItemEvent::Failed {
                id: item_id,
                job_id,
                status,
            },
        };
        self.ctx.events().publish(DomainEvent::Item(event));

        Ok(CheckpointOutcome::Applied)
    }

    /// Release a lock without changing status, e.g. on worker-slice timeout.
    pub async fn release_lock(&self, item_id: i64, worker_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE job_items SET status = 'PENDING', locked_by = NULL, locked_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND locked_by = $2",
        )
        .bind(item_id)
        .bind(worker_id)
        .execute(self.ctx.pool())
        .await?;
        Ok(())
    }

    /// Force-clear every lock in the table. Called once at startup to recover
    /// items left locked by an unclean shutdown.
    pub async fn force_unlock_all(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE job_items SET status = 'PENDING', locked_by = NULL, locked_at = NULL, updated_at = NOW() \
             WHERE status = 'PROCESSING'",
        )
        .execute(self.ctx.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// List items for a job in `(updated_at, id)` order, keyset-paginated.
    pub async fn list_items(
        &self,
        job_id: i64,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<ListItemsPage> {
        let after = cursor.and_then(Cursor::decode);

        let rows = match after {
            Some(c) => {
                sqlx::query_as::<_, JobItem>(
                    r#"
                    SELECT * FROM job_items
                    WHERE job_id = $1 AND (updated_at, id) > ($2, $3)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $4
                    "#,
                )
                .bind(job_id)
                .bind(c.updated_at)
                .bind(c.id)
                .bind(limit)
                .fetch_all(self.ctx.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, JobItem>(
                    r#"
                    SELECT * FROM job_items
                    WHERE job_id = $1
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $2
                    "#,
                )
                .bind(job_id)
                .bind(limit)
                .fetch_all(self.ctx.pool())
                .await?
            }
        };

        let next_cursor = rows
            .last()
            .map(|last| Cursor::new(last.updated_at, last.id).encode());

        Ok(ListItemsPage {
            items: rows.iter().map(JobItemSummary::from_item).collect(),
            next_cursor,
        })
    }

    /// Reset items matching `scope` back to `PENDING` so they are eligible for
    /// another claim. By default attempts keep accumulating across calls
    /// (they are not reset) so `max_attempts_*` still bounds total lifetime
    /// work on a pathological item; pass `reset_attempts = true` to zero them.
    ///
    /// `ReprocessScope::All` is "all failed+not_found under attempt cap": it
    /// never touches `DONE` items, and only requeues `ERROR`/`NOT_FOUND` rows
    /// that haven't yet exhausted `max_attempts_error`/`max_attempts_not_found`.
    pub async fn reprocess(
        &self,
        job_id: i64,
        scope: ReprocessScope,
        reset_attempts: bool,
        max_attempts_error: i32,
        max_attempts_not_found: i32,
    ) -> Result<u64> {
        let attempts_clause = if reset_attempts { "0" } else { "attempts" };

        let affected = match scope {
            ReprocessScope::All => {
                let sql = format!(
                    "UPDATE job_items SET status = 'PENDING', attempts = {attempts_clause}, \
                     locked_by = NULL, locked_at = NULL, last_error = NULL, updated_at = NOW() \
                     WHERE job_id = $1 AND (\
                       (status = 'ERROR' AND attempts < $2) OR \
                       (status = 'NOT_FOUND' AND attempts < $3)\
                     )"
                );
                sqlx::query(&sql)
                    .bind(job_id)
                    .bind(max_attempts_error)
                    .bind(max_attempts_not_found)
                    .execute(self.ctx.pool())
                    .await?
            }
            ReprocessScope::ErrorsOnly => {
                let sql = format!(
                    "UPDATE job_items SET status = 'PENDING', attempts = {attempts_clause}, \
                     locked_by = NULL, locked_at = NULL, last_error = NULL, updated_at = NOW() \
                     WHERE job_id = $1 AND status = 'ERROR'"
                );
                sqlx::query(&sql).bind(job_id).execute(self.ctx.pool()).await?
            }
            ReprocessScope::NotFoundOnly => {
                let sql = format!(
                    "UPDATE job_items SET status = 'PENDING', attempts = {attempts_clause}, \
                     locked_by = NULL, locked_at = NULL, last_error = NULL, updated_at = NOW() \
                     WHERE job_id = $1 AND status = 'NOT_FOUND'"
                );
                sqlx::query(&sql).bind(job_id).execute(self.ctx.pool()).await?
            }
            ReprocessScope::Ids(ids) => {
                let sql = format!(
                    "UPDATE job_items SET status = 'PENDING', attempts = {attempts_clause}, \
                     locked_by = NULL, locked_at = NULL, last_error = NULL, updated_at = NOW() \
                     WHERE job_id = $1 AND id = ANY($2) AND status IN ('ERROR', 'NOT_FOUND', 'DONE')"
                );
                sqlx::query(&sql)
                    .bind(job_id)
                    .bind(&ids)
                    .execute(self.ctx.pool())
                    .await?
            }
        };

        Ok(affected.rows_affected())
    }

    /// List items across every job, filtered by owner/status/type, keyset-paginated
    /// on the fleet-wide `(status, owner_id, updated_at, id)` index. `owner_id = None`
    /// means "any owner" (admin view); `statuses = None` means "any status".
    pub async fn list_pending(
        &self,
        owner_id: Option<&str>,
        statuses: Option<&[JobItemStatus]>,
        job_type: Option<JobType>,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<ListItemsPage> {
        let after = cursor.and_then(Cursor::decode);
        let status_filter: Option<Vec<&'static str>> =
            statuses.map(|ss| ss.iter().copied().map(status_text).collect());
        let job_type_filter = job_type.map(job_type_text);

        let rows = match after {
            Some(c) => {
                sqlx::query_as::<_, JobItem>(
                    r#"
                    SELECT * FROM job_items
                    WHERE ($1::text IS NULL OR owner_id = $1)
                      AND ($2::text[] IS NULL OR status = ANY($2))
                      AND ($3::text IS NULL OR job_type = $3)
                      AND (updated_at, id) > ($4, $5)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $6
                    "#,
                )
                .bind(owner_id)
                .bind(&status_filter)
                .bind(job_type_filter)
                .bind(c.updated_at)
                .bind(c.id)
                .bind(limit)
                .fetch_all(self.ctx.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, JobItem>(
                    r#"
                    SELECT * FROM job_items
                    WHERE ($1::text IS NULL OR owner_id = $1)
                      AND ($2::text[] IS NULL OR status = ANY($2))
                      AND ($3::text IS NULL OR job_type = $3)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $4
                    "#,
                )
                .bind(owner_id)
                .bind(&status_filter)
                .bind(job_type_filter)
                .bind(limit)
                .fetch_all(self.ctx.pool())
                .await?
            }
        };

        let next_cursor = rows
            .last()
            .map(|last| Cursor::new(last.updated_at, last.id).encode());

        Ok(ListItemsPage {
            items: rows.iter().map(JobItemSummary::from_item).collect(),
            next_cursor,
        })
    }

    pub async fn get_item(&self, item_id: i64) -> Result<Option<JobItem>> {
        let item = sqlx::query_as::<_, JobItem>("SELECT * FROM job_items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(self.ctx.pool())
            .await?;
        Ok(item)
    }

    /// All items in a job with a `result_json`, for export. Includes `ERROR`
    /// items (rendered with `match_quality: "none"` by the caller) so an
    /// export always accounts for every submitted row.
    pub async fn list_for_export(&self, job_id: i64) -> Result<Vec<JobItem>> {
        let rows = sqlx::query_as::<_, JobItem>(
            "SELECT * FROM job_items WHERE job_id = $1 ORDER BY id ASC",
        )
        .bind(job_id)
        .fetch_all(self.ctx.pool())
        .await?;
        Ok(rows)
    }
}
