//! Session and endpoint DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{NodeId, Session, SessionInfo};
use crate::endpoint::Endpoint;

/// Local session detail for `GET /api/v1/sessions/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDto {
    /// Session identifier.
    pub session_id: String,
    /// Endpoint path.
    pub path: String,
    /// Client address.
    pub remote_addr: String,
    /// Authenticated identity, if any.
    pub identity: Option<String>,
    /// Owning node.
    pub node_id: String,
    /// Accept timestamp.
    pub created_at: DateTime<Utc>,
    /// `false` once a close has been requested.
    pub open: bool,
}

impl SessionDto {
    /// Projects a live local session.
    #[must_use]
    pub fn from_session(session: &Session, node_id: &NodeId) -> Self {
        Self {
            session_id: session.id().to_string(),
            path: session.path().to_string(),
            remote_addr: session.remote_addr().to_string(),
            identity: session.identity().map(str::to_string),
            node_id: node_id.to_string(),
            created_at: session.created_at(),
            open: session.is_open(),
        }
    }
}

/// One registered endpoint for `GET /api/v1/endpoints`.
#[derive(Debug, Serialize, ToSchema)]
pub struct EndpointDto {
    /// Endpoint path.
    pub path: String,
    /// Ordering metadata.
    pub order: i32,
    /// Names of the callbacks that are set.
    pub callbacks: Vec<String>,
    /// Sessions connected to this node.
    pub local_sessions: usize,
    /// Sessions known across the cluster.
    pub cluster_sessions: usize,
}

impl EndpointDto {
    /// Projects an endpoint with its session counts.
    #[must_use]
    pub fn new(endpoint: &Endpoint, local_sessions: usize, cluster_sessions: usize) -> Self {
        Self {
            path: endpoint.path().to_string(),
            order: endpoint.order(),
            callbacks: endpoint
                .callbacks()
                .present()
                .into_iter()
                .map(str::to_string)
                .collect(),
            local_sessions,
            cluster_sessions,
        }
    }
}

/// Query for `GET /api/v1/cluster/sessions`.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ClusterSessionsQuery {
    /// Endpoint path.
    pub path: String,
}

/// Location of one session in the cluster.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionLocationDto {
    /// Session identifier.
    pub session_id: String,
    /// Owning node.
    pub node_id: String,
    /// Accept timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<SessionInfo> for SessionLocationDto {
    fn from(info: SessionInfo) -> Self {
        Self {
            session_id: info.session_id.to_string(),
            node_id: info.node_id.to_string(),
            created_at: info.created_at,
        }
    }
}

/// Response for `GET /api/v1/cluster/sessions`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClusterSessionsResponse {
    /// Endpoint path.
    pub path: String,
    /// Known sessions on the path, oldest first.
    pub sessions: Vec<SessionLocationDto>,
}
