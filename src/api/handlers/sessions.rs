//! Endpoint listing and per-session administration.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    EndpointDto, SendMessageRequest, SendMessageResponse, SessionDto, parse_session_id,
};
use crate::app_state::AppState;
use crate::domain::CloseReason;
use crate::error::{ErrorResponse, GatewayError};

/// `GET /endpoints` — List registered endpoints.
#[utoipa::path(
    get,
    path = "/api/v1/endpoints",
    tag = "Endpoints",
    summary = "List endpoints",
    description = "Returns every registered WebSocket endpoint with its callbacks and session counts.",
    responses(
        (status = 200, description = "Registered endpoints", body = Vec<EndpointDto>),
    )
)]
pub async fn list_endpoints(State(state): State<AppState>) -> impl IntoResponse {
    let endpoints: Vec<EndpointDto> = state
        .lifecycle
        .endpoints()
        .endpoints()
        .iter()
        .map(|endpoint| {
            EndpointDto::new(
                endpoint,
                state.dispatcher.session_count(endpoint.path()),
                state.dispatcher.cluster_session_count(endpoint.path()),
            )
        })
        .collect();
    Json(endpoints)
}

/// `GET /sessions/:id` — Get a local session.
///
/// # Errors
///
/// Returns [`GatewayError::SessionNotFound`] if the session is not
/// connected to this node.
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}",
    tag = "Sessions",
    summary = "Get session",
    description = "Returns a session connected to this node.",
    params(
        ("id" = String, Path, description = "Session UUID"),
    ),
    responses(
        (status = 200, description = "Session detail", body = SessionDto),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "Session not connected here", body = ErrorResponse),
    )
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let session_id = parse_session_id(&id)?;
    let session = state
        .lifecycle
        .registry()
        .get(&session_id)
        .ok_or(GatewayError::SessionNotFound(session_id))?;
    Ok(Json(SessionDto::from_session(&session, &state.config.node_id)))
}

/// `DELETE /sessions/:id` — Force-close a local session.
///
/// # Errors
///
/// Returns [`GatewayError::SessionNotFound`] if the session is not (or no
/// longer) connected to this node.
#[utoipa::path(
    delete,
    path = "/api/v1/sessions/{id}",
    tag = "Sessions",
    summary = "Close session",
    description = "Closes a local session with code 1008. Closing an already closed session reports 404 and has no other effect.",
    params(
        ("id" = String, Path, description = "Session UUID"),
    ),
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "Session not connected here", body = ErrorResponse),
    )
)]
pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let session_id = parse_session_id(&id)?;
    if !state
        .lifecycle
        .close(&session_id, CloseReason::policy("closed by administrator"))
    {
        return Err(GatewayError::SessionNotFound(session_id));
    }
    tracing::info!(session_id = %session_id, "session force-closed");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /sessions/:id/messages` — Send to one session, cluster-wide.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for a malformed body and
/// [`GatewayError::SessionNotFound`] if no node is known to own the
/// session.
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/messages",
    tag = "Sessions",
    summary = "Send to session",
    description = "Queues a message on a local session, or forwards it to the peer that owns the session. Forwarded delivery is not confirmed.",
    params(
        ("id" = String, Path, description = "Session UUID"),
    ),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Delivered locally", body = SendMessageResponse),
        (status = 202, description = "Forwarded to the owning peer", body = SendMessageResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Session unknown to the cluster", body = ErrorResponse),
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let session_id = parse_session_id(&id)?;
    let payload = req.message.into_payload()?;
    let local = state.lifecycle.registry().get(&session_id).is_some();
    if !local && state.cluster().locate(&req.path, &session_id).is_none() {
        return Err(GatewayError::SessionNotFound(session_id));
    }

    let delivered = state
        .dispatcher
        .send_to_session(&req.path, &session_id, payload);
    let status = if local { StatusCode::OK } else { StatusCode::ACCEPTED };
    Ok((
        status,
        Json(SendMessageResponse {
            session_id: session_id.to_string(),
            delivered,
            forwarded: !local,
        }),
    ))
}

/// Composes the session routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/endpoints", get(list_endpoints))
        .route("/sessions/{id}", get(get_session).delete(close_session))
        .route("/sessions/{id}/messages", post(send_message))
}
