//! REST API handlers.
//!
//! Each handler reads via the shared coordination state and returns
//! JSON responses. Liveness-sensitive views evaluate against the
//! current wall clock.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use guardant_queue::{JobRecord, QueueStats};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Regions ────────────────────────────────────────────────────

/// GET /api/v1/regions
pub async fn list_regions(State(state): State<ApiState>) -> impl IntoResponse {
    match state.catalog.availability(&state.registry, epoch_ms()) {
        Ok(regions) => ApiResponse::ok(regions).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Workers ────────────────────────────────────────────────────

/// GET /api/v1/workers
pub async fn list_workers(State(state): State<ApiState>) -> impl IntoResponse {
    match state.registry.live_workers(epoch_ms()) {
        Ok(workers) => ApiResponse::ok(workers).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Incidents ──────────────────────────────────────────────────

/// GET /api/v1/incidents
pub async fn list_incidents(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_incidents() {
        Ok(incidents) => ApiResponse::ok(incidents).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Status ─────────────────────────────────────────────────────

/// GET /api/v1/status/:nest_id/:service_id
pub async fn get_status(
    State(state): State<ApiState>,
    Path((nest_id, service_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_status(&nest_id, &service_id, epoch_ms()) {
        Ok(Some(result)) => ApiResponse::ok(result).into_response(),
        Ok(None) => error_response("no recent status", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Queue ──────────────────────────────────────────────────────

/// Queue counters plus the retained settled-job records.
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueView {
    pub stats: QueueStats,
    pub completed: Vec<JobRecord>,
    pub failed: Vec<JobRecord>,
}

/// GET /api/v1/queue
pub async fn queue_stats(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(QueueView {
        stats: state.queue.stats(),
        completed: state.queue.completed_records(),
        failed: state.queue.failed_records(),
    })
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshots = state.metrics.snapshot().await;
    let body = guardant_metrics::render_prometheus(&snapshots);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
