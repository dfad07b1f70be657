//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection: inbound
//! frames go to the session lifecycle, queued outbound payloads go to the
//! socket, and a close request on the session ends the loop with a close
//! frame.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use super::messages::{close_message, from_message, to_message};
use crate::domain::{CloseReason, OutboundReceiver, Session};
use crate::error::CallbackError;
use crate::service::SessionLifecycle;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Registers the session and fires `on_open`.
/// - Feeds every data frame from the client through the lifecycle.
/// - Writes queued outbound payloads to the client in queue order.
/// - Ends when the client leaves, the socket fails or the session is closed
///   from elsewhere, and always finishes with exactly one lifecycle close.
pub async fn run_connection(
    socket: WebSocket,
    lifecycle: SessionLifecycle,
    session: Arc<Session>,
    mut outbound: OutboundReceiver,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let session_id = session.id();

    if let Err(err) = lifecycle.open(Arc::clone(&session)) {
        tracing::error!(session_id = %session_id, error = %err, "session registration failed");
        let _ = ws_tx
            .send(close_message(&CloseReason::internal("registration failed")))
            .await;
        return;
    }

    let mut close_reason = CloseReason::normal();
    loop {
        tokio::select! {
            biased;

            // Closed through the lifecycle (admin force-close, shutdown)
            () = session.closed() => {
                if ws_tx.send(close_message(&session.close_reason())).await.is_err() {
                    tracing::debug!(session_id = %session_id, "close frame not delivered");
                }
                break;
            }
            // Outbound payload queued by the dispatcher
            payload = outbound.recv() => {
                let Some(payload) = payload else { break };
                if ws_tx.send(to_message(payload)).await.is_err() {
                    break;
                }
            }
            // Incoming frame from the client
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(frame) = frame {
                            close_reason = CloseReason {
                                code: frame.code,
                                reason: frame.reason.as_str().to_owned(),
                            };
                        }
                        break;
                    }
                    Some(Ok(message)) => {
                        if let Some(payload) = from_message(message) {
                            lifecycle.inbound(&session, payload);
                        }
                    }
                    Some(Err(err)) => {
                        lifecycle.report_error(&session, &CallbackError::Transport(err.to_string()));
                        close_reason = CloseReason::internal("transport error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    lifecycle.close(&session_id, close_reason);
    tracing::debug!(session_id = %session_id, "ws connection closed");
}
