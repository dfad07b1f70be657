//! Axum WebSocket upgrade handler.
//!
//! The handshake slot was taken when the TCP connection was accepted.
//! Admission here needs a registered endpoint for the matched path and an
//! accepted authentication. Any failure is answered with a plain HTTP error
//! response and no callback fires. The slot is returned once the upgraded
//! socket reaches its connection task.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, MatchedPath, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::auth::{AuthResult, HandshakeRequest};
use crate::domain::Session;
use crate::error::GatewayError;
use crate::handshake::ClientConnection;

/// `GET {endpoint path}` — Upgrade HTTP connection to WebSocket.
///
/// # Errors
///
/// - [`GatewayError::EndpointNotFound`] when the path has no endpoint.
/// - [`GatewayError::Unauthorized`] when the authenticator rejects.
pub async fn ws_handler(
    State(state): State<AppState>,
    matched: MatchedPath,
    ConnectInfo(connection): ConnectInfo<ClientConnection>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, GatewayError> {
    let remote_addr = connection.remote_addr;
    let path = matched.as_str().to_string();
    if state.lifecycle.endpoints().get(&path).is_none() {
        return Err(GatewayError::EndpointNotFound(path));
    }

    let request = HandshakeRequest {
        path,
        remote_addr,
        headers,
        query,
    };
    let identity = match state.authenticator.authenticate(&request) {
        AuthResult::Accepted { identity } => identity,
        AuthResult::Rejected { reason } => {
            tracing::info!(
                path = %request.path,
                remote_addr = %remote_addr,
                %reason,
                "handshake rejected"
            );
            return Err(GatewayError::Unauthorized(reason));
        }
    };

    let config = Arc::clone(&state.config);
    let mut ws = ws
        .max_frame_size(config.max_frame_size)
        .max_message_size(config.max_frame_size);
    if !config.subprotocols.is_empty() {
        ws = ws.protocols(config.subprotocols.clone());
    }

    let path = request.path;
    let lifecycle = state.lifecycle.clone();
    let response = ws
        .on_failed_upgrade(move |error| {
            tracing::warn!(remote_addr = %remote_addr, %error, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            connection.release_slot();
            let (session, outbound) =
                Session::new(path, remote_addr, identity, config.session_send_buffer);
            run_connection(socket, lifecycle, Arc::new(session), outbound).await;
        });
    Ok(response.into_response())
}
