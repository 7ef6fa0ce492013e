//! Router composition: job lifecycle, item listings, and process status.

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::{collections::BTreeMap, time::Duration};
use ts_rs::TS;

use crate::state::AppState;
use crate::status::ServiceStatus;
use crate::web::items::{list_items, list_pending};
use crate::web::jobs::{create_job, export, get_job, kickoff, pause, reprocess, resume};
use tower_http::cors::{Any, CorsLayer};
use tower_http::{
    classify::ServerErrorsFailureClass, compression::CompressionLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{Span, debug, warn};

/// Creates the web server router.
pub fn create_router(app_state: AppState) -> Router {
    let jobs_router = Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/{job_id}/items", get(list_items))
        .route("/jobs/{job_id}/kickoff", post(kickoff))
        .route("/jobs/{job_id}/pause", post(pause))
        .route("/jobs/{job_id}/resume", post(resume))
        .route("/jobs/{job_id}/reprocess", post(reprocess))
        .route("/jobs/{job_id}/export", get(export))
        .route("/items", get(list_pending))
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(app_state);

    Router::new()
        .nest("/api", jobs_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer((
            CompressionLayer::new()
                .zstd(true)
                .br(true)
                .gzip(true)
                .quality(tower_http::CompressionLevel::Fastest),
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    tracing::debug_span!("request", path = request.uri().path())
                })
                .on_request(())
                .on_body_chunk(())
                .on_eos(())
                .on_response(
                    |response: &axum::response::Response<Body>, latency: Duration, _span: &Span| {
                        let latency_threshold = if cfg!(debug_assertions) {
                            Duration::from_millis(100)
                        } else {
                            Duration::from_millis(1000)
                        };

                        let status = format!(
                            "{} {}",
                            response.status().as_u16(),
                            response.status().canonical_reason().unwrap_or("??")
                        );

                        if latency > latency_threshold {
                            warn!(latency = format!("{latency:.2?}"), status, "Response");
                        } else {
                            debug!(latency = format!("{latency:.2?}"), status, "Response");
                        }
                    },
                )
                .on_failure(
                    |error: ServerErrorsFailureClass, latency: Duration, _span: &Span| {
                        warn!(error = ?error, latency = format!("{latency:.2?}"), "Request failed");
                    },
                ),
            TimeoutLayer::new(Duration::from_secs(10)),
        ))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct ServiceInfo {
    name: String,
    status: ServiceStatus,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct StatusResponse {
    status: ServiceStatus,
    version: String,
    commit: String,
    services: BTreeMap<String, ServiceInfo>,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let mut services = BTreeMap::new();

    for (name, svc_status) in state.service_statuses.all() {
        services.insert(name.clone(), ServiceInfo { name, status: svc_status });
    }

    let overall_status = if services.values().any(|s| matches!(s.status, ServiceStatus::Error)) {
        ServiceStatus::Error
    } else if !services.is_empty()
        && services.values().all(|s| matches!(s.status, ServiceStatus::Active | ServiceStatus::Connected))
    {
        ServiceStatus::Active
    } else if services.is_empty() {
        ServiceStatus::Disabled
    } else {
        ServiceStatus::Active
    };

    Json(StatusResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("GIT_COMMIT_HASH").to_string(),
        services,
    })
}
