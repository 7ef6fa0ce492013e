//! Job-scoped endpoints (§6): create, read, drive, and export a job.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::db::ReprocessScope;
use crate::domain::model::{Job, JobItem, JobType, MatchQuality, QueueState, ResultRecord};
use crate::error::Result as CrateResult;
use crate::ingest;
use crate::state::AppState;
use crate::web::error::{ApiError, db_error};
use crate::web::extractors::AuthUser;
use crate::worker::{self, SliceSummary};

/// Fetches `job_id` and enforces ownership: the caller's `owner_id` must
/// match, or the caller must be an admin. A job outside the caller's scope
/// is reported as not found rather than forbidden, so its existence isn't
/// leaked to callers who can't see it.
pub(crate) async fn load_owned_job(state: &AppState, auth: &AuthUser, job_id: i64) -> Result<Job, ApiError> {
    let job = state
        .db
        .jobs()
        .get_job(job_id)
        .await
        .map_err(|e| db_error("get_job", e))?
        .ok_or_else(|| ApiError::not_found("job not found"))?;

    if job.owner_id != auth.owner_id && !auth.is_admin {
        return Err(ApiError::not_found("job not found"));
    }

    Ok(job)
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct JobResponse {
    pub id: i64,
    pub owner_id: String,
    pub job_type: JobType,
    pub queue_state: QueueState,
    pub attempts: i32,
    pub total_items: i32,
    pub processed_items: i32,
    pub failed_items: i32,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            owner_id: job.owner_id,
            job_type: job.job_type,
            queue_state: job.queue_state,
            attempts: job.attempts,
            total_items: job.total_items,
            processed_items: job.processed_items,
            failed_items: job.failed_items,
            last_heartbeat: job.last_heartbeat,
            last_error: job.last_error,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub job_type: JobType,
    /// Path/handle a [`crate::adapters::FileParser`] can stream rows from.
    /// Required for `CSV`; ignored in favor of `rows` otherwise.
    pub source_ref: Option<String>,
    /// Rows to ingest directly, bypassing the file parser. Used for `SINGLE`
    /// and `IMAGE` submissions, or a `CSV` submission with no file adapter.
    #[serde(default)]
    pub rows: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateJobResponse {
    pub job_id: i64,
}

/// `POST /api/jobs`
pub async fn create_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateJobRequest>,
) -> Result<Json<CreateJobResponse>, ApiError> {
    let rows: Box<dyn Iterator<Item = CrateResult<serde_json::Value>> + Send> = match &req.source_ref {
        Some(source_ref) if req.job_type == JobType::Csv => state
            .file_parser
            .stream_rows(source_ref)
            .map_err(|e| ApiError::bad_request(format!("could not read source: {e}")))?,
        _ => Box::new(req.rows.into_iter().map(Ok)),
    };

    let job = ingest::ingest_submission(
        &state.db,
        &state.ingest_config,
        &auth.owner_id,
        req.job_type,
        req.source_ref.as_deref(),
        rows,
    )
    .await
    .map_err(|e| db_error("ingest_submission", e))?;

    Ok(Json(CreateJobResponse { job_id: job.id }))
}

/// `GET /api/jobs/:job_id`
pub async fn get_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<i64>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = load_owned_job(&state, &auth, job_id).await?;
    Ok(Json(JobResponse::from(job)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickoffRequest {
    #[serde(default = "default_slice_ms")]
    pub slice_ms: u64,
}

fn default_slice_ms() -> u64 {
    5_000
}

/// `POST /api/jobs/:job_id/kickoff`
pub async fn kickoff(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<i64>,
    Json(req): Json<KickoffRequest>,
) -> Result<Json<SliceSummary>, ApiError> {
    load_owned_job(&state, &auth, job_id).await?;

    let summary = worker::kickoff(
        &state.db,
        &state.pricing_deps,
        &state.worker_config,
        &state.worker_id,
        job_id,
        req.slice_ms,
    )
    .await
    .map_err(|e| db_error("kickoff", e))?;

    Ok(Json(summary))
}

/// `POST /api/jobs/:job_id/pause` — only valid while `RUNNING`.
pub async fn pause(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<i64>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = load_owned_job(&state, &auth, job_id).await?;
    if job.queue_state != QueueState::Running {
        return Err(ApiError::conflict("job is not running"));
    }

    state
        .db
        .jobs()
        .transition(job_id, QueueState::Paused)
        .await
        .map_err(|e| db_error("pause", e))?;

    let job = load_owned_job(&state, &auth, job_id).await?;
    Ok(Json(JobResponse::from(job)))
}

/// `POST /api/jobs/:job_id/resume` — only valid while `PAUSED`.
pub async fn resume(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<i64>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = load_owned_job(&state, &auth, job_id).await?;
    if job.queue_state != QueueState::Paused {
        return Err(ApiError::conflict("job is not paused"));
    }

    state
        .db
        .jobs()
        .transition(job_id, QueueState::Running)
        .await
        .map_err(|e| db_error("resume", e))?;

    let job = load_owned_job(&state, &auth, job_id).await?;
    Ok(Json(JobResponse::from(job)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReprocessScopeRequest {
    All,
    ErrorsOnly,
    NotFoundOnly,
    Ids,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessRequest {
    pub scope: ReprocessScopeRequest,
    #[serde(default)]
    pub item_ids: Vec<i64>,
    #[serde(default)]
    pub reset_attempts: bool,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReprocessResponse {
    pub affected: u64,
}

/// `POST /api/jobs/:job_id/reprocess`
pub async fn reprocess(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<i64>,
    Json(req): Json<ReprocessRequest>,
) -> Result<Json<ReprocessResponse>, ApiError> {
    load_owned_job(&state, &auth, job_id).await?;

    let scope = match req.scope {
        ReprocessScopeRequest::All => ReprocessScope::All,
        ReprocessScopeRequest::ErrorsOnly => ReprocessScope::ErrorsOnly,
        ReprocessScopeRequest::NotFoundOnly => ReprocessScope::NotFoundOnly,
        ReprocessScopeRequest::Ids => {
            if req.item_ids.is_empty() {
                return Err(ApiError::bad_request("scope \"ids\" requires a non-empty item_ids"));
            }
            ReprocessScope::Ids(req.item_ids.clone())
        }
    };

    let affected = state
        .db
        .items()
        .reprocess(
            job_id,
            scope,
            req.reset_attempts,
            state.worker_config.max_attempts_error,
            state.worker_config.max_attempts_not_found,
        )
        .await
        .map_err(|e| db_error("reprocess", e))?;

    state
        .db
        .audit_events()
        .append(
            "reprocess_requested",
            Some(job_id),
            None,
            &auth.owner_id,
            &serde_json::json!({"affected": affected, "resetAttempts": req.reset_attempts}),
        )
        .await
        .map_err(|e| db_error("reprocess", e))?;

    if affected > 0 {
        state
            .db
            .jobs()
            .transition(job_id, QueueState::Queued)
            .await
            .map_err(|e| db_error("reprocess", e))?;
    }

    Ok(Json(ReprocessResponse { affected }))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Tabular,
    Delimited,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

struct ExportRow {
    item_id: i64,
    title: Option<String>,
    brand: Option<String>,
    result: ResultRecord,
}

fn export_rows(items: &[JobItem]) -> Vec<ExportRow> {
    items
        .iter()
        .map(|item| {
            let title = item
                .normalized_json
                .as_ref()
                .and_then(|v| v.get("title"))
                .and_then(|v| v.as_str())
                .map(str::to_owned);
            let brand = item
                .normalized_json
                .as_ref()
                .and_then(|v| v.get("brand"))
                .and_then(|v| v.as_str())
                .map(str::to_owned);
            let result = item
                .result_json
                .as_ref()
                .and_then(|v| serde_json::from_value::<ResultRecord>(v.clone()).ok())
                .unwrap_or_else(ResultRecord::none);
            ExportRow { item_id: item.id, title, brand, result }
        })
        .collect()
}

fn render_tabular(items: &[JobItem]) -> Vec<u8> {
    let mut out = String::from("item_id\ttitle\tbrand\tprice\tcurrency\tsource\tmatch_quality\n");
    for row in export_rows(items) {
        let price = row.result.price.map(|p| format!("{p:.2}")).unwrap_or_default();
        let quality = match row.result.match_quality {
            MatchQuality::Verified => "verified",
            MatchQuality::Trusted => "trusted",
            MatchQuality::Estimated => "estimated",
            MatchQuality::None => "none",
        };
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            row.item_id,
            row.title.as_deref().unwrap_or(""),
            row.brand.as_deref().unwrap_or(""),
            price,
            row.result.currency,
            row.result.source,
            quality,
        ));
    }
    out.into_bytes()
}

fn render_delimited(items: &[JobItem]) -> Result<Vec<u8>, ApiError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["item_id", "title", "brand", "price", "currency", "source", "match_quality"])
        .map_err(|e| ApiError::internal_error(format!("export encoding failed: {e}")))?;

    for row in export_rows(items) {
        let price = row.result.price.map(|p| format!("{p:.2}")).unwrap_or_default();
        let quality = match row.result.match_quality {
            MatchQuality::Verified => "verified",
            MatchQuality::Trusted => "trusted",
            MatchQuality::Estimated => "estimated",
            MatchQuality::None => "none",
        };
        writer
            .write_record([
                row.item_id.to_string(),
                row.title.unwrap_or_default(),
                row.brand.unwrap_or_default(),
                price,
                row.result.currency,
                row.result.source,
                quality.to_string(),
            ])
            .map_err(|e| ApiError::internal_error(format!("export encoding failed: {e}")))?;
    }

    writer
        .into_inner()
        .map_err(|e| ApiError::internal_error(format!("export encoding failed: {e}")))
}

/// `GET /api/jobs/:job_id/export?format=tabular|delimited`
///
/// Streams bytes built from each item's already-persisted `result_json`;
/// nothing is recomputed, so an export always reflects exactly what the
/// pipeline decided.
pub async fn export(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<i64>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    load_owned_job(&state, &auth, job_id).await?;

    let items = state
        .db
        .items()
        .list_for_export(job_id)
        .await
        .map_err(|e| db_error("export", e))?;

    let (content_type, body) = match query.format {
        ExportFormat::Tabular => ("text/plain; charset=utf-8", render_tabular(&items)),
        ExportFormat::Delimited => ("text/csv; charset=utf-8", render_delimited(&items)?),
    };

    Ok(([(axum::http::header::CONTENT_TYPE, content_type)], body).into_response())
}
