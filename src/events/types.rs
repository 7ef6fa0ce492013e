//! Domain event types broadcast over the in-process ring buffer.

use serde::Serialize;
use ts_rs::TS;

use crate::domain::model::{JobItemStatus, MatchQuality, QueueState};

/// Unified enum for all domain events.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    Job(JobEvent),
    Item(ItemEvent),
    Audit(AuditBroadcast),
}

/// Events broadcast when a job's own state changes.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export)]
pub enum JobEvent {
    Created {
        id: i64,
        #[serde(rename = "ownerId")]
        owner_id: String,
        #[serde(rename = "totalItems")]
        total_items: i32,
    },
    StateChanged {
        id: i64,
        state: QueueState,
    },
    Progress {
        id: i64,
        #[serde(rename = "processedItems")]
        processed_items: i32,
        #[serde(rename = "failedItems")]
        failed_items: i32,
    },
}

/// Events broadcast as individual items move through the pricing pipeline.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export)]
pub enum ItemEvent {
    Claimed {
        id: i64,
        #[serde(rename = "jobId")]
        job_id: i64,
        #[serde(rename = "workerId")]
        worker_id: String,
    },
    Resolved {
        id: i64,
        #[serde(rename = "jobId")]
        job_id: i64,
        #[serde(rename = "matchQuality")]
        match_quality: MatchQuality,
    },
    Failed {
        id: i64,
        #[serde(rename = "jobId")]
        job_id: i64,
        status: JobItemStatus,
    },
}

/// One entry appended to the lifecycle audit log.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuditBroadcast {
    pub id: i64,
    #[serde(rename = "eventKind")]
    pub event_kind: String,
    #[serde(rename = "jobId")]
    pub job_id: Option<i64>,
    #[serde(rename = "actorId")]
    pub actor_id: String,
}
