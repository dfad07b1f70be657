//! Cluster-visible projection of a session and the node identity it
//! belongs to.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SessionId;

/// Identity of one gateway process inside a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a `NodeId` from a configured name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generates a random node name of the form `node-<uuid>`.
    #[must_use]
    pub fn random() -> Self {
        Self(format!("node-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Returns the node name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Value snapshot of a session that is allowed to cross process boundaries.
///
/// Never a live reference: a node only ever holds send handles for the
/// sessions it owns. Staleness after a disconnect is expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session identifier.
    pub session_id: SessionId,
    /// Endpoint path the session is bound to.
    pub path: String,
    /// Node owning the connection.
    pub node_id: NodeId,
    /// When the session was accepted.
    pub created_at: DateTime<Utc>,
}
