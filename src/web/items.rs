//! Keyset-paginated item listings (§6): per-job and fleet-wide.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::domain::model::{JobItemStatus, JobItemSummary, JobType};
use crate::state::AppState;
use crate::web::error::{ApiError, db_error};
use crate::web::extractors::AuthUser;
use crate::web::jobs::load_owned_job;

fn default_page_size() -> i64 {
    50
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ItemsPageResponse {
    pub items: Vec<JobItemSummary>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItemsQuery {
    pub cursor: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

/// `GET /api/jobs/:job_id/items`
pub async fn list_items(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<i64>,
    Query(query): Query<ListItemsQuery>,
) -> Result<Json<ItemsPageResponse>, ApiError> {
    load_owned_job(&state, &auth, job_id).await?;

    let page_size = query.page_size.clamp(1, 500);
    let page = state
        .db
        .items()
        .list_items(job_id, query.cursor.as_deref(), page_size)
        .await
        .map_err(|e| db_error("list_items", e))?;

    Ok(Json(ItemsPageResponse { items: page.items, next_cursor: page.next_cursor }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPendingQuery {
    pub cursor: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    /// Restricts the listing to another owner's items; admin-only. Ignored
    /// for non-admins, who always see only their own items.
    pub owner: Option<String>,
    #[serde(default)]
    pub status: Vec<JobItemStatus>,
    pub job_type: Option<JobType>,
}

/// `GET /api/items` — fleet-wide keyset listing across every job a caller can see.
pub async fn list_pending(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListPendingQuery>,
) -> Result<Json<ItemsPageResponse>, ApiError> {
    let owner_filter: Option<String> = if auth.is_admin {
        query.owner.clone()
    } else {
        Some(auth.owner_id.clone())
    };

    let status_filter = if query.status.is_empty() { None } else { Some(query.status.as_slice()) };

    let page_size = query.page_size.clamp(1, 500);
    let page = state
        .db
        .items()
        .list_pending(
            owner_filter.as_deref(),
            status_filter,
            query.job_type,
            query.cursor.as_deref(),
            page_size,
        )
        .await
        .map_err(|e| db_error("list_pending", e))?;

    Ok(Json(ItemsPageResponse { items: page.items, next_cursor: page.next_cursor }))
}
