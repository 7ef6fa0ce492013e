//! Entity shapes for jobs, job items, and their audit trail.
//!
//! Every enum maps to a plain `TEXT` column (checked at the schema level by a
//! `CHECK` constraint, not a native Postgres enum type) so additive schema
//! changes never require a migration-time `ALTER TYPE`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, TS)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum JobType {
    Csv,
    Image,
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, TS)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum QueueState {
    Queued,
    Running,
    Paused,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, TS)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum JobItemStatus {
    Pending,
    Processing,
    Done,
    Error,
    NotFound,
    /// Reserved for a future manual/admin skip action; no pipeline path writes it.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, TS)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum SearchOutcome {
    Hit,
    Miss,
    Error,
    Timeout,
}

/// A unit of submitted work owned by one principal.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Job {
    pub id: i64,
    pub owner_id: String,
    pub job_type: JobType,
    pub source_ref: Option<String>,
    pub queue_state: QueueState,
    pub attempts: i32,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub total_items: i32,
    pub processed_items: i32,
    pub failed_items: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The atomic unit of pricing work.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobItem {
    pub id: i64,
    pub job_id: i64,
    pub owner_id: String,
    pub job_type: JobType,
    pub status: JobItemStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub input_json: serde_json::Value,
    pub normalized_json: Option<serde_json::Value>,
    pub result_json: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A small server-side summary of a [`JobItem`], used by listing endpoints that
/// must never project `input_json`/`result_json` in full.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct JobItemSummary {
    pub id: i64,
    pub job_id: i64,
    pub status: JobItemStatus,
    pub attempts: i32,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub sku: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobItemSummary {
    pub fn from_item(item: &JobItem) -> Self {
        let normalized = item.normalized_json.as_ref();
        Self {
            id: item.id,
            job_id: item.job_id,
            status: item.status,
            attempts: item.attempts,
            title: normalized
                .and_then(|v| v.get("title"))
                .and_then(|v| v.as_str())
                .map(str::to_owned),
            brand: normalized
                .and_then(|v| v.get("brand"))
                .and_then(|v| v.as_str())
                .map(str::to_owned),
            sku: normalized
                .and_then(|v| v.get("sku"))
                .and_then(|v| v.as_str())
                .map(str::to_owned),
            updated_at: item.updated_at,
        }
    }
}

/// Append-only record of one external search call.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchEvent {
    pub id: i64,
    pub job_item_id: i64,
    pub provider: String,
    pub query: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: SearchOutcome,
    pub latency_ms: i32,
    pub error_kind: Option<String>,
    pub result_count: i32,
    pub chosen_url: Option<String>,
}

/// One entry in the general-purpose lifecycle audit log (distinct from
/// [`SearchEvent`], which is specific to provider calls).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEvent {
    pub id: i64,
    pub event_kind: String,
    pub job_id: Option<i64>,
    pub item_id: Option<i64>,
    pub ts: DateTime<Utc>,
    pub actor_id: String,
    pub payload: serde_json::Value,
}

/// Canonical descriptor produced by normalization (§4.5 state 1).
///
/// `extras` carries non-critical fields the caller supplied (e.g. a
/// spreadsheet column we don't model explicitly) without smuggling untyped
/// maps through the rest of the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub title: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub condition: Option<String>,
    pub estimated_price: Option<f64>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum MatchQuality {
    Verified,
    Trusted,
    Estimated,
    None,
}

/// The canonical `result_json` shape, persisted and exported verbatim. Field
/// names are written exactly as declared here (snake_case) — this is the
/// one DTO in the crate whose JSON shape is a stored, externally documented
/// contract rather than an HTTP-response convenience, so it does not take
/// the crate's usual `camelCase` rename.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ResultRecord {
    pub price: Option<f64>,
    pub currency: String,
    pub source: String,
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub match_quality: MatchQuality,
    pub is_estimated: bool,
}

impl ResultRecord {
    pub fn none() -> Self {
        Self {
            price: None,
            currency: "USD".to_string(),
            source: String::new(),
            url: None,
            category: None,
            subcategory: None,
            match_quality: MatchQuality::None,
            is_estimated: false,
        }
    }
}
