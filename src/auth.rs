//! Handshake authentication.
//!
//! An [`Authenticator`] runs exactly once per connection attempt, before a
//! session exists. It only reads the request; a rejection makes the
//! acceptor answer the upgrade request with `401` so no session is built
//! and no callback fires.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

/// The parts of an upgrade request an authenticator may inspect.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    /// Endpoint path being upgraded.
    pub path: String,
    /// Client address.
    pub remote_addr: SocketAddr,
    /// Request headers.
    pub headers: HeaderMap,
    /// Decoded query parameters.
    pub query: HashMap<String, String>,
}

impl HandshakeRequest {
    /// Returns the bearer token from the `Authorization` header, falling back
    /// to the `token` or `access_token` query parameter (browsers cannot set
    /// headers on WebSocket requests).
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        let from_header = self
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());
        from_header.or_else(|| {
            self.query
                .get("token")
                .or_else(|| self.query.get("access_token"))
                .map(String::as_str)
                .filter(|token| !token.is_empty())
        })
    }
}

/// Outcome of authenticating one handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    /// The handshake may proceed, optionally with an established identity.
    Accepted {
        /// Identity attached to the session.
        identity: Option<String>,
    },
    /// The handshake is refused.
    Rejected {
        /// Reason logged and returned in the `401` body.
        reason: String,
    },
}

impl AuthResult {
    /// Accepts with the given identity.
    #[must_use]
    pub const fn accept(identity: Option<String>) -> Self {
        Self::Accepted { identity }
    }

    /// Rejects with the given reason.
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`AuthResult::Accepted`].
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Pluggable handshake check. Must be pure and fast: it runs on the
/// request path of every connection attempt.
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// Decides whether the handshake may proceed.
    fn authenticate(&self, request: &HandshakeRequest) -> AuthResult;
}

/// Accepts every handshake without an identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAll;

impl Authenticator for PermitAll {
    fn authenticate(&self, _request: &HandshakeRequest) -> AuthResult {
        AuthResult::accept(None)
    }
}

/// Accepts handshakes carrying one of a fixed set of bearer tokens.
#[derive(Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Option<String>>,
}

impl StaticTokenAuthenticator {
    /// Creates an authenticator from `(token, identity)` pairs.
    #[must_use]
    pub fn new<I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }
}

impl fmt::Debug for StaticTokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenAuthenticator")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, request: &HandshakeRequest) -> AuthResult {
        let Some(token) = request.bearer_token() else {
            return AuthResult::reject("missing bearer token");
        };
        match self.tokens.get(token) {
            Some(identity) => AuthResult::accept(identity.clone()),
            None => AuthResult::reject("invalid token"),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn request(headers: HeaderMap, query: &[(&str, &str)]) -> HandshakeRequest {
        HandshakeRequest {
            path: "/chat".to_string(),
            remote_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            headers,
            query: query
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    fn authenticator() -> StaticTokenAuthenticator {
        StaticTokenAuthenticator::new([
            ("secret".to_string(), Some("alice".to_string())),
            ("anon".to_string(), None),
        ])
    }

    #[test]
    fn permit_all_accepts() {
        assert!(PermitAll.authenticate(&request(HeaderMap::new(), &[])).is_accepted());
    }

    #[test]
    fn header_token_maps_to_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        assert_eq!(
            authenticator().authenticate(&request(headers, &[])),
            AuthResult::accept(Some("alice".to_string()))
        );
    }

    #[test]
    fn query_token_is_accepted() {
        assert_eq!(
            authenticator().authenticate(&request(HeaderMap::new(), &[("token", "anon")])),
            AuthResult::accept(None)
        );
        assert!(
            authenticator()
                .authenticate(&request(HeaderMap::new(), &[("access_token", "secret")]))
                .is_accepted()
        );
    }

    #[test]
    fn missing_or_wrong_token_is_rejected() {
        assert_eq!(
            authenticator().authenticate(&request(HeaderMap::new(), &[])),
            AuthResult::reject("missing bearer token")
        );
        assert_eq!(
            authenticator().authenticate(&request(HeaderMap::new(), &[("token", "nope")])),
            AuthResult::reject("invalid token")
        );
    }
}
