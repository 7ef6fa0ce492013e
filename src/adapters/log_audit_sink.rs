//! Minimal reference [`AuditSink`] that emits via `tracing`. Fire-and-forget,
//! per the port contract; a deployment that needs a durable or off-process
//! audit trail swaps this for a sink backed by the `audit_events` table or an
//! external system (C9 non-goals — neither is built out here).

use async_trait::async_trait;

use super::AuditSink;

pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn emit(&self, event_kind: &str, job_id: Option<i64>, payload: serde_json::Value) {
        tracing::info!(event_kind, job_id, %payload, "audit event");
    }
}
