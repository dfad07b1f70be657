//! Cluster location queries and the peer inbound endpoint.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use subtle::ConstantTimeEq;

use crate::api::dto::{ClusterSessionsQuery, ClusterSessionsResponse};
use crate::app_state::AppState;
use crate::cluster::{CLUSTER_INBOUND_PATH, CLUSTER_SECRET_HEADER, ClusterEnvelope};
use crate::error::{ErrorResponse, GatewayError};

/// `GET /cluster/sessions` — Cluster-wide sessions on a path.
#[utoipa::path(
    get,
    path = "/api/v1/cluster/sessions",
    tag = "Cluster",
    summary = "Cluster session locations",
    description = "Returns the eventually consistent location index for a path, all nodes included.",
    params(ClusterSessionsQuery),
    responses(
        (status = 200, description = "Known sessions", body = ClusterSessionsResponse),
    )
)]
pub async fn cluster_sessions(
    State(state): State<AppState>,
    Query(query): Query<ClusterSessionsQuery>,
) -> impl IntoResponse {
    let sessions = state
        .cluster()
        .sessions_in_cluster(&query.path)
        .into_iter()
        .map(Into::into)
        .collect();
    Json(ClusterSessionsResponse {
        path: query.path,
        sessions,
    })
}

/// `POST /internal/cluster` — Receive an envelope from a peer.
///
/// # Errors
///
/// Returns [`GatewayError::Unauthorized`] if this node has no cluster
/// secret configured or the request does not carry it.
#[utoipa::path(
    post,
    path = "/internal/cluster",
    tag = "Cluster",
    summary = "Peer envelope",
    description = "Applies a cluster envelope published by a peer. Broadcasts are delivered to local sessions only and never re-published.",
    request_body = serde_json::Value,
    responses(
        (status = 202, description = "Envelope applied"),
        (status = 401, description = "Missing or wrong cluster secret, or no secret configured", body = ErrorResponse),
    )
)]
pub async fn receive_envelope(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(envelope): Json<ClusterEnvelope>,
) -> Result<impl IntoResponse, GatewayError> {
    let Some(secret) = &state.config.cluster_secret else {
        tracing::warn!(peer = %envelope.source, "cluster envelope refused: no secret configured");
        return Err(GatewayError::Unauthorized(
            "cluster intake is disabled".to_string(),
        ));
    };
    let presented = headers
        .get(CLUSTER_SECRET_HEADER)
        .map(|value| value.as_bytes())
        .unwrap_or_default();
    if !bool::from(presented.ct_eq(secret.as_bytes())) {
        tracing::warn!(peer = %envelope.source, "cluster envelope with bad secret");
        return Err(GatewayError::Unauthorized("invalid cluster secret".to_string()));
    }
    state.cluster().handle_inbound(envelope);
    Ok(StatusCode::ACCEPTED)
}

/// Cluster query routes mounted under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/cluster/sessions", get(cluster_sessions))
}

/// Peer route mounted at the root level.
pub fn internal_routes() -> Router<AppState> {
    Router::new().route(CLUSTER_INBOUND_PATH, post(receive_envelope))
}
