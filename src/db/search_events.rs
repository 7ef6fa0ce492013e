//! Append-only log of individual provider search calls (C9 telemetry).

use chrono::{DateTime, Utc};

use crate::db::DbContext;
use crate::domain::model::{SearchEvent, SearchOutcome};
use crate::error::Result;

pub struct SearchEventOps<'a> {
    ctx: &'a DbContext,
}

impl<'a> SearchEventOps<'a> {
    pub(crate) fn new(ctx: &'a DbContext) -> Self {
        Self { ctx }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        job_item_id: i64,
        provider: &str,
        query: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        outcome: SearchOutcome,
        latency_ms: i32,
        error_kind: Option<&str>,
        result_count: i32,
        chosen_url: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO search_events (
                job_item_id, provider, query, started_at, finished_at,
                outcome, latency_ms, error_kind, result_count, chosen_url
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job_item_id)
        .bind(provider)
        .bind(query)
        .bind(started_at)
        .bind(finished_at)
        .bind(outcome)
        .bind(latency_ms)
        .bind(error_kind)
        .bind(result_count)
        .bind(chosen_url)
        .execute(self.ctx.pool())
        .await?;

        Ok(())
    }

    pub async fn for_item(&self, job_item_id: i64) -> Result<Vec<SearchEvent>> {
        let rows = sqlx::query_as::<_, SearchEvent>(
            "SELECT * FROM search_events WHERE job_item_id = $1 ORDER BY started_at ASC",
        )
        .bind(job_item_id)
        .fetch_all(self.ctx.pool())
        .await?;
        Ok(rows)
    }
}
