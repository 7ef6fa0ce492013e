//! Job lifecycle operations with automatic event emission.

use crate::db::DbContext;
use crate::domain::model::{Job, JobType, QueueState};
use crate::error::Result;
use crate::events::{DomainEvent, JobEvent};

pub struct JobOps<'a> {
    ctx: &'a DbContext,
}

impl<'a> JobOps<'a> {
    pub(crate) fn new(ctx: &'a DbContext) -> Self {
        Self { ctx }
    }

    /// Create a new job in `QUEUED` state with zero items. [`super::items::JobItemOps::bulk_insert_items`]
    /// fills in `total_items` once the batch is parsed.
    ///
    /// Emits `JobEvent::Created`.
    pub async fn create_job(
        &self,
        owner_id: &str,
        job_type: JobType,
        source_ref: Option<&str>,
    ) -> Result<Job> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (owner_id, job_type, source_ref, queue_state)
            VALUES ($1, $2, $3, 'QUEUED')
            RETURNING *
            "#,
        )
        .bind(owner_id)
        .bind(job_type)
        .bind(source_ref)
        .fetch_one(self.ctx.pool())
        .await?;

        self.ctx.events().publish(DomainEvent::Job(JobEvent::Created {
            id: job.id,
            owner_id: job.owner_id.clone(),
            total_items: job.total_items,
        }));

        Ok(job)
    }

    pub async fn get_job(&self, job_id: i64) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(self.ctx.pool())
            .await?;
        Ok(job)
    }

    /// Move a job to a new [`QueueState`]. Any transition the caller requests is
    /// accepted here; validating that it is legal for the current state is the
    /// HTTP layer's job (see the kickoff/pause/resume handlers).
    ///
    /// Emits `JobEvent::StateChanged`.
    pub async fn transition(&self, job_id: i64, state: QueueState) -> Result<()> {
        sqlx::query("UPDATE jobs SET queue_state = $2, updated_at = NOW() WHERE id = $1")
            .bind(job_id)
            .bind(state)
            .execute(self.ctx.pool())
            .await?;

        self.ctx
            .events()
            .publish(DomainEvent::Job(JobEvent::StateChanged { id: job_id, state }));

        Ok(())
    }

    /// Record a liveness heartbeat from the worker currently driving this job.
    pub async fn heartbeat(&self, job_id: i64) -> Result<()> {
        sqlx::query("UPDATE jobs SET last_heartbeat = NOW() WHERE id = $1")
            .bind(job_id)
            .execute(self.ctx.pool())
            .await?;
        Ok(())
    }

    pub async fn record_error(&self, job_id: i64, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET last_error = $2, attempts = attempts + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(error)
        .execute(self.ctx.pool())
        .await?;
        Ok(())
    }

    /// Recompute `total_items`/`processed_items`/`failed_items` from the
    /// authoritative `job_items` rows and, if the job has no items left in a
    /// non-terminal status, transition it to `DONE`.
    ///
    /// Emits `JobEvent::Progress`, and `JobEvent::StateChanged` if the job
    /// completed as a result.
    pub async fn recompute_counters(&self, job_id: i64) -> Result<Job> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs SET
                total_items = (SELECT COUNT(*) FROM job_items WHERE job_id = $1),
                processed_items = (
                    SELECT COUNT(*) FROM job_items
                    WHERE job_id = $1 AND status IN ('DONE', 'SKIPPED')
                ),
                failed_items = (
                    SELECT COUNT(*) FROM job_items
                    WHERE job_id = $1 AND status IN ('ERROR', 'NOT_FOUND')
                ),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .fetch_one(self.ctx.pool())
        .await?;

        self.ctx.events().publish(DomainEvent::Job(JobEvent::Progress {
            id: job.id,
            processed_items: job.processed_items,
            failed_items: job.failed_items,
        }));

        if job.total_items > 0
            && job.processed_items + job.failed_items >= job.total_items
            && job.queue_state != QueueState::Done
        {
            self.transition(job_id, QueueState::Done).await?;
            return self.get_job(job_id).await.map(|j| j.unwrap_or(job));
        }

        Ok(job)
    }
}
