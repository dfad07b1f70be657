//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response,
//! which is also how a rejected WebSocket handshake is answered.
//! [`CallbackError`] is what application callbacks report back to the
//! dispatch boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::SessionId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 4001,
///     "message": "unauthorized: missing bearer token",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see [`GatewayError`] code ranges).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category           | HTTP Status                  |
/// |-----------|--------------------|------------------------------|
/// | 1000–1999 | Validation         | 400 Bad Request              |
/// | 2000–2999 | Not Found/Conflict | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server             | 500 / 502                    |
/// | 4000–4999 | Admission          | 401 / 503                    |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Endpoint path is malformed or reserved.
    #[error("invalid endpoint path: {0}")]
    InvalidEndpointPath(String),

    /// Configuration value could not be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No endpoint is registered for the requested path.
    #[error("no endpoint registered for path {0}")]
    EndpointNotFound(String),

    /// Session is not connected to this node.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// An endpoint was registered twice for the same path.
    #[error("endpoint already registered for path {0}")]
    DuplicateEndpoint(String),

    /// A session id was registered twice.
    #[error("session already registered: {0}")]
    DuplicateSession(SessionId),

    /// Peer transport failure.
    #[error("cluster error: {0}")]
    Cluster(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Handshake or peer request failed authentication.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The bound on concurrently pending handshakes is exhausted.
    #[error("too many pending handshakes")]
    TooManyHandshakes,
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidEndpointPath(_) => 1002,
            Self::InvalidConfig(_) => 1003,
            Self::EndpointNotFound(_) => 2001,
            Self::SessionNotFound(_) => 2002,
            Self::DuplicateEndpoint(_) => 2101,
            Self::DuplicateSession(_) => 2102,
            Self::Internal(_) => 3000,
            Self::Cluster(_) => 3001,
            Self::Unauthorized(_) => 4001,
            Self::TooManyHandshakes => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidEndpointPath(_) | Self::InvalidConfig(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::EndpointNotFound(_) | Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateEndpoint(_) | Self::DuplicateSession(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Cluster(_) => StatusCode::BAD_GATEWAY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::TooManyHandshakes => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns the JSON body sent for this error.
    #[must_use]
    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = axum::Json(self.to_body()).into_response();
        *response.status_mut() = status;
        response
    }
}

/// Failure reported by an application callback.
///
/// Caught at the dispatch boundary; never propagates to the connection
/// task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    /// The callback returned an error.
    #[error("{0}")]
    Failed(String),

    /// The callback panicked; the panic message is captured.
    #[error("callback panicked: {0}")]
    Panicked(String),

    /// The underlying connection reported an error.
    #[error("transport error: {0}")]
    Transport(String),
}

impl CallbackError {
    /// Convenience constructor for [`CallbackError::Failed`].
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
