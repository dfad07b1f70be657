//! Conversions between WebSocket frames and gateway payloads.

use axum::extract::ws::{CloseFrame, Message};

use crate::domain::{CloseReason, Payload};

/// Converts an outbound payload into a data frame.
#[must_use]
pub fn to_message(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::Text(text.into()),
        Payload::Binary(bytes) => Message::Binary(bytes.into()),
    }
}

/// Extracts the payload of a data frame. Control frames yield `None`.
#[must_use]
pub fn from_message(message: Message) -> Option<Payload> {
    match message {
        Message::Text(text) => Some(Payload::Text(text.as_str().to_owned())),
        Message::Binary(bytes) => Some(Payload::Binary(bytes.to_vec())),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}

/// Builds the close frame sent for `reason`.
#[must_use]
pub fn close_message(reason: &CloseReason) -> Message {
    Message::Close(Some(CloseFrame {
        code: reason.code,
        reason: reason.reason.clone().into(),
    }))
}
