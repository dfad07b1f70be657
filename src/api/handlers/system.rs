//! System endpoints: health check and statistics.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::{HealthResponse, PathCount, StatsResponse};
use crate::app_state::AppState;

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, node id, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            node_id: state.config.node_id.to_string(),
        }),
    )
}

/// `GET /stats` — Session, traffic and cluster counters.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "System",
    summary = "Gateway statistics",
    description = "Returns local session counts per path, tracer counters, and cluster relay counters.",
    responses(
        (status = 200, description = "Current counters", body = StatsResponse),
    )
)]
pub async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.lifecycle.registry();
    let sessions_by_path = registry
        .path_counts()
        .into_iter()
        .map(|(path, sessions)| PathCount { path, sessions })
        .collect();
    Json(StatsResponse {
        node_id: state.config.node_id.to_string(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        sessions_total: registry.len(),
        sessions_by_path,
        free_handshake_slots: state.handshake_slots.available_permits(),
        traffic: state.lifecycle.tracer().counters(),
        cluster: state.cluster().stats(),
    })
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
}
