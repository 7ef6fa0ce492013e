//! Append-only lifecycle audit log, distinct from [`super::search_events`].

use crate::db::DbContext;
use crate::domain::model::AuditEvent;
use crate::error::Result;
use crate::events::{AuditBroadcast, DomainEvent};

pub struct AuditEventOps<'a> {
    ctx: &'a DbContext,
}

impl<'a> AuditEventOps<'a> {
    pub(crate) fn new(ctx: &'a DbContext) -> Self {
        Self { ctx }
    }

    pub async fn append(
        &self,
        event_kind: &str,
        job_id: Option<i64>,
        item_id: Option<i64>,
        actor_id: &str,
        payload: &serde_json::Value,
    ) -> Result<AuditEvent> {
        let event = sqlx::query_as::<_, AuditEvent>(
            r#"
            INSERT INTO audit_events (event_kind, job_id, item_id, actor_id, payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(event_kind)
        .bind(job_id)
        .bind(item_id)
        .bind(actor_id)
        .bind(payload)
        .fetch_one(self.ctx.pool())
        .await?;

        self.ctx.events().publish(DomainEvent::Audit(AuditBroadcast {
            id: event.id,
            event_kind: event.event_kind.clone(),
            job_id: event.job_id,
            actor_id: event.actor_id.clone(),
        }));

        Ok(event)
    }

    pub async fn for_job(&self, job_id: i64, limit: i64) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query_as::<_, AuditEvent>(
            "SELECT * FROM audit_events WHERE job_id = $1 ORDER BY ts DESC LIMIT $2",
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(self.ctx.pool())
        .await?;
        Ok(rows)
    }
}
