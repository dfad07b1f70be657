//! Messages exchanged between gateway nodes.
//!
//! Every envelope names its source node. A node ignores envelopes it sent
//! itself and never re-publishes a broadcast it received from a peer, so a
//! payload crosses the cluster at most once per publish.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{NodeId, Payload, Session, SessionId, SessionInfo};

/// Chooses which local sessions on a path receive a cluster-wide broadcast.
///
/// Evaluated independently by every node against its own sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionSelector {
    /// Every session on the path.
    #[default]
    All,
    /// Only the listed sessions.
    Sessions {
        /// Session identifiers to include.
        ids: Vec<SessionId>,
    },
    /// Every session except the listed ones.
    ExceptSessions {
        /// Session identifiers to skip.
        ids: Vec<SessionId>,
    },
    /// Sessions whose authenticated identity is in the list.
    Identities {
        /// Identities to include.
        identities: Vec<String>,
    },
}

impl SessionSelector {
    /// Returns `true` if `session` is selected.
    #[must_use]
    pub fn matches(&self, session: &Session) -> bool {
        match self {
            Self::All => true,
            Self::Sessions { ids } => ids.contains(&session.id()),
            Self::ExceptSessions { ids } => !ids.contains(&session.id()),
            Self::Identities { identities } => session
                .identity()
                .is_some_and(|identity| identities.iter().any(|i| i == identity)),
        }
    }
}

/// Broadcast relayed to peers so they deliver to their own sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    /// Endpoint path.
    pub path: String,
    /// Payload to deliver.
    pub payload: Payload,
    /// Local sessions to include on each node.
    #[serde(default)]
    pub selector: SessionSelector,
}

/// Payload for one session owned by `target_node`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// Endpoint path the session must be bound to.
    pub path: String,
    /// Target session.
    pub session_id: SessionId,
    /// Node believed to own the session.
    pub target_node: NodeId,
    /// Payload to deliver.
    pub payload: Payload,
}

/// Body of a cluster envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterMessage {
    /// A session connected on the source node.
    SessionAdded {
        /// Location fact.
        session: SessionInfo,
    },
    /// A session disconnected from the source node.
    SessionRemoved {
        /// Session identifier.
        session_id: SessionId,
        /// Endpoint path it was bound to.
        path: String,
    },
    /// Deliver to local sessions on a path.
    Broadcast(BroadcastMessage),
    /// Deliver to one session on its owning node.
    Direct(DirectMessage),
    /// The source node is shutting down; forget its sessions.
    NodeLeft,
    /// The source node asks peers for their local sessions.
    SyncRequest,
    /// Answer to a sync request: the source node's local sessions.
    Sync {
        /// Location facts for every local session of the source node.
        sessions: Vec<SessionInfo>,
    },
}

impl ClusterMessage {
    /// Returns the wire tag of this message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SessionAdded { .. } => "session_added",
            Self::SessionRemoved { .. } => "session_removed",
            Self::Broadcast(_) => "broadcast",
            Self::Direct(_) => "direct",
            Self::NodeLeft => "node_left",
            Self::SyncRequest => "sync_request",
            Self::Sync { .. } => "sync",
        }
    }
}

/// A [`ClusterMessage`] stamped with its source node and send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEnvelope {
    /// Node that published the envelope.
    pub source: NodeId,
    /// When it was published.
    pub timestamp: DateTime<Utc>,
    /// Message body.
    pub message: ClusterMessage,
}

impl ClusterEnvelope {
    /// Stamps `message` with `source` and the current time.
    #[must_use]
    pub fn new(source: NodeId, message: ClusterMessage) -> Self {
        Self {
            source,
            timestamp: Utc::now(),
            message,
        }
    }
}
