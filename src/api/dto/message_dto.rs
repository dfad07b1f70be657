//! Message DTOs for targeted sends and broadcasts.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::cluster::SessionSelector;
use crate::domain::{Payload, SessionId};
use crate::error::GatewayError;

/// Message body shared by send and broadcast requests. Exactly one of
/// `text` and `binary` must be set.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct MessageBody {
    /// UTF-8 text frame content.
    #[serde(default)]
    pub text: Option<String>,
    /// Binary frame content as a byte array.
    #[serde(default)]
    pub binary: Option<Vec<u8>>,
}

impl MessageBody {
    /// Converts the body into a payload.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] unless exactly one of
    /// `text` and `binary` is set.
    pub fn into_payload(self) -> Result<Payload, GatewayError> {
        match (self.text, self.binary) {
            (Some(text), None) => Ok(Payload::Text(text)),
            (None, Some(bytes)) => Ok(Payload::Binary(bytes)),
            _ => Err(GatewayError::InvalidRequest(
                "exactly one of `text` and `binary` is required".to_string(),
            )),
        }
    }
}

/// Request body for `POST /api/v1/sessions/{id}/messages`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    /// Endpoint path the session is bound to.
    pub path: String,
    /// Message content.
    #[serde(flatten)]
    pub message: MessageBody,
}

/// Response body for `POST /api/v1/sessions/{id}/messages`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SendMessageResponse {
    /// Target session.
    pub session_id: String,
    /// `true` if this node queued the message on the session.
    pub delivered: bool,
    /// `true` if the message was forwarded to the owning peer.
    pub forwarded: bool,
}

/// Request body for `POST /api/v1/broadcast`.
///
/// At most one of `session_ids`, `except_session_ids` and `identities`
/// narrows the audience; none means every session on the path.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BroadcastRequest {
    /// Endpoint path.
    pub path: String,
    /// Message content.
    #[serde(flatten)]
    pub message: MessageBody,
    /// Deliver on this node only.
    #[serde(default)]
    pub local_only: bool,
    /// Only these sessions.
    #[serde(default)]
    pub session_ids: Vec<String>,
    /// Every session except these.
    #[serde(default)]
    pub except_session_ids: Vec<String>,
    /// Only sessions authenticated as one of these identities.
    #[serde(default)]
    pub identities: Vec<String>,
}

impl BroadcastRequest {
    /// Builds the selector described by the request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if more than one audience
    /// list is set or a session id is not a UUID.
    pub fn selector(&self) -> Result<SessionSelector, GatewayError> {
        let lists = [
            !self.session_ids.is_empty(),
            !self.except_session_ids.is_empty(),
            !self.identities.is_empty(),
        ];
        if lists.iter().filter(|set| **set).count() > 1 {
            return Err(GatewayError::InvalidRequest(
                "only one of `session_ids`, `except_session_ids`, `identities` may be set"
                    .to_string(),
            ));
        }
        if !self.session_ids.is_empty() {
            return Ok(SessionSelector::Sessions {
                ids: parse_ids(&self.session_ids)?,
            });
        }
        if !self.except_session_ids.is_empty() {
            return Ok(SessionSelector::ExceptSessions {
                ids: parse_ids(&self.except_session_ids)?,
            });
        }
        if !self.identities.is_empty() {
            return Ok(SessionSelector::Identities {
                identities: self.identities.clone(),
            });
        }
        Ok(SessionSelector::All)
    }
}

/// Response body for `POST /api/v1/broadcast`.
#[derive(Debug, Serialize, ToSchema)]
pub struct BroadcastResponse {
    /// Endpoint path.
    pub path: String,
    /// Local sessions the message was queued on.
    pub delivered_locally: usize,
    /// `true` if the broadcast was handed to the cluster.
    pub propagated: bool,
}

/// Parses a session id from its string form.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if `raw` is not a UUID.
pub fn parse_session_id(raw: &str) -> Result<SessionId, GatewayError> {
    raw.parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("invalid session id: {raw}")))
}

fn parse_ids(raw: &[String]) -> Result<Vec<SessionId>, GatewayError> {
    raw.iter().map(|id| parse_session_id(id)).collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn request(json: &str) -> BroadcastRequest {
        let Ok(request) = serde_json::from_str(json) else {
            panic!("invalid test json: {json}");
        };
        request
    }

    #[test]
    fn body_requires_exactly_one_kind() {
        assert!(MessageBody::default().into_payload().is_err());
        let both = MessageBody {
            text: Some("a".to_string()),
            binary: Some(vec![1]),
        };
        assert!(both.into_payload().is_err());
        let text = MessageBody {
            text: Some("a".to_string()),
            binary: None,
        };
        assert_eq!(text.into_payload().ok(), Some(Payload::from("a")));
    }

    #[test]
    fn flattened_body_parses() {
        let req = request(r#"{"path":"/chat","text":"hi","local_only":true}"#);
        assert!(req.local_only);
        assert_eq!(req.message.text.as_deref(), Some("hi"));
        assert!(matches!(req.selector(), Ok(SessionSelector::All)));
    }

    #[test]
    fn selector_from_lists() {
        let id = SessionId::new();
        let req = request(&format!(r#"{{"path":"/chat","text":"x","session_ids":["{id}"]}}"#));
        assert_eq!(req.selector().ok(), Some(SessionSelector::Sessions { ids: vec![id] }));

        let req = request(r#"{"path":"/chat","text":"x","identities":["alice"]}"#);
        assert!(matches!(req.selector(), Ok(SessionSelector::Identities { .. })));

        let req = request(r#"{"path":"/chat","text":"x","session_ids":["nope"]}"#);
        assert!(matches!(req.selector(), Err(GatewayError::InvalidRequest(_))));

        let req = request(r#"{"path":"/chat","text":"x","identities":["a"],"except_session_ids":["b"]}"#);
        assert!(matches!(req.selector(), Err(GatewayError::InvalidRequest(_))));
    }
}
