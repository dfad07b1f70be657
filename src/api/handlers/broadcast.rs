//! Broadcast handler.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{BroadcastRequest, BroadcastResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /broadcast` — Broadcast to an endpoint path.
///
/// # Errors
///
/// Returns [`GatewayError::EndpointNotFound`] for an unregistered path and
/// [`GatewayError::InvalidRequest`] for a malformed body or selector.
#[utoipa::path(
    post,
    path = "/api/v1/broadcast",
    tag = "Messages",
    summary = "Broadcast",
    description = "Delivers a message to the selected sessions on a path. Unless `local_only` is set, peers deliver it to their own sessions as well.",
    request_body = BroadcastRequest,
    responses(
        (status = 200, description = "Broadcast accepted", body = BroadcastResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Unknown endpoint path", body = ErrorResponse),
    )
)]
pub async fn broadcast(
    State(state): State<AppState>,
    Json(req): Json<BroadcastRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    if state.lifecycle.endpoints().get(&req.path).is_none() {
        return Err(GatewayError::EndpointNotFound(req.path));
    }
    let selector = req.selector()?;
    let payload = req.message.into_payload()?;

    let delivered_locally = if req.local_only {
        state
            .dispatcher
            .broadcast_local(&req.path, payload, |session| selector.matches(session))
    } else {
        state
            .dispatcher
            .broadcast_matching(&req.path, payload, selector)
    };
    tracing::debug!(
        path = %req.path,
        delivered_locally,
        local_only = req.local_only,
        "admin broadcast"
    );

    Ok(Json(BroadcastResponse {
        path: req.path,
        delivered_locally,
        propagated: !req.local_only,
    }))
}

/// Composes the broadcast routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/broadcast", post(broadcast))
}
