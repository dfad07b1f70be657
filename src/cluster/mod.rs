//! Cross-node session locations and payload relay.
//!
//! [`ClusterManager`] keeps an eventually consistent index of
//! `path -> {SessionInfo}` across all nodes and relays broadcasts and
//! targeted sends to peers through a [`ClusterTransport`].
//!
//! # Propagation rules
//!
//! - Local facts (session added/removed) are always published.
//! - An inbound broadcast is delivered to local sessions only. It is never
//!   re-published, which bounds fan-out to one hop.
//! - An inbound direct message is delivered only if its target node is this
//!   node and the session is still registered; otherwise it is dropped
//!   silently.
//! - Envelopes published by this node are ignored on receipt.
//! - Only a `sync_request` makes the inbound path publish (the `sync`
//!   answer), and a `sync` never triggers anything.

pub mod http;
pub mod messages;
#[cfg(test)]
pub(crate) mod recording;
pub mod transport;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

pub use http::{CLUSTER_INBOUND_PATH, HttpPeerTransport};
pub use messages::{
    BroadcastMessage, ClusterEnvelope, ClusterMessage, DirectMessage, SessionSelector,
};
pub use transport::{ClusterHub, ClusterTransport, HubTransport, StandaloneTransport};

use crate::domain::{NodeId, Payload, SessionId, SessionInfo, SessionRegistry};
use crate::telemetry::GatewayTracer;

/// Header carrying the shared cluster secret on peer requests.
pub const CLUSTER_SECRET_HEADER: &str = "x-cluster-secret";

/// Point-in-time copy of the manager's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ClusterStats {
    /// This node's identity.
    pub node_id: String,
    /// Transport in use.
    pub transport: String,
    /// Envelopes handed to the transport.
    pub published: u64,
    /// Envelopes received from peers (own envelopes excluded).
    pub received: u64,
    /// Payloads delivered to local sessions on behalf of peers.
    pub relayed: u64,
    /// Direct messages dropped because the target was gone or elsewhere.
    pub dropped: u64,
    /// Sessions in the location index, all nodes included.
    pub known_sessions: usize,
}

/// Maintains the cluster location index and relays payloads.
#[derive(Debug)]
pub struct ClusterManager {
    node_id: NodeId,
    transport: Arc<dyn ClusterTransport>,
    registry: Arc<SessionRegistry>,
    tracer: Arc<dyn GatewayTracer>,
    locations: DashMap<String, DashMap<SessionId, SessionInfo>>,
    published: AtomicU64,
    received: AtomicU64,
    relayed: AtomicU64,
    dropped: AtomicU64,
}

impl ClusterManager {
    /// Creates a manager for `node_id` publishing through `transport`.
    #[must_use]
    pub fn new(
        node_id: NodeId,
        transport: Arc<dyn ClusterTransport>,
        registry: Arc<SessionRegistry>,
        tracer: Arc<dyn GatewayTracer>,
    ) -> Self {
        Self {
            node_id,
            transport,
            registry,
            tracer,
            locations: DashMap::new(),
            published: AtomicU64::new(0),
            received: AtomicU64::new(0),
            relayed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Returns this node's identity.
    #[must_use]
    pub const fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Records a local session and tells peers about it.
    pub fn session_added(&self, info: SessionInfo) {
        self.insert_location(info.clone());
        self.publish(ClusterMessage::SessionAdded { session: info });
    }

    /// Forgets a local session and tells peers about it.
    pub fn session_removed(&self, session_id: SessionId, path: &str) {
        self.remove_location(path, &session_id, &self.node_id);
        self.publish(ClusterMessage::SessionRemoved {
            session_id,
            path: path.to_string(),
        });
    }

    /// Asks peers to deliver `payload` to their selected sessions on `path`.
    pub fn publish_broadcast(&self, path: &str, payload: Payload, selector: SessionSelector) {
        self.publish(ClusterMessage::Broadcast(BroadcastMessage {
            path: path.to_string(),
            payload,
            selector,
        }));
    }

    /// Forwards `payload` to the node that owns `session_id`.
    ///
    /// Returns `true` if a peer owner was known and the envelope was
    /// published. Whether the peer delivered it is not observable.
    pub fn route_direct(&self, path: &str, session_id: SessionId, payload: Payload) -> bool {
        let Some(info) = self.locate(path, &session_id) else {
            tracing::debug!(session_id = %session_id, path, "no known owner for session");
            return false;
        };
        if info.node_id == self.node_id {
            // Stale local entry: the registry already said the session is gone.
            return false;
        }
        self.publish(ClusterMessage::Direct(DirectMessage {
            path: path.to_string(),
            session_id,
            target_node: info.node_id,
            payload,
        }));
        true
    }

    /// Asks peers to send their local session locations.
    pub fn announce(&self) {
        self.publish(ClusterMessage::SyncRequest);
    }

    /// Tells peers this node is leaving so they purge its sessions.
    pub fn leave(&self) {
        self.publish(ClusterMessage::NodeLeft);
    }

    /// Applies one envelope received from the cluster.
    ///
    /// Returns the number of local sessions a payload was delivered to.
    pub fn handle_inbound(&self, envelope: ClusterEnvelope) -> usize {
        if envelope.source == self.node_id {
            return 0;
        }
        self.received.fetch_add(1, Ordering::Relaxed);
        let source = envelope.source;
        tracing::debug!(
            node_id = %self.node_id,
            peer = %source,
            kind = envelope.message.kind(),
            "cluster envelope received"
        );

        match envelope.message {
            ClusterMessage::SessionAdded { session } => {
                if session.node_id == source {
                    self.insert_location(session);
                }
                0
            }
            ClusterMessage::SessionRemoved { session_id, path } => {
                self.remove_location(&path, &session_id, &source);
                0
            }
            ClusterMessage::Broadcast(message) => self.deliver_broadcast(&message),
            ClusterMessage::Direct(message) => self.deliver_direct(message),
            ClusterMessage::NodeLeft => {
                let purged = self.purge_node(&source);
                tracing::info!(peer = %source, purged, "peer left the cluster");
                0
            }
            ClusterMessage::SyncRequest => {
                let sessions = self
                    .registry
                    .all()
                    .iter()
                    .map(|session| session.info(&self.node_id))
                    .collect();
                self.publish(ClusterMessage::Sync { sessions });
                0
            }
            ClusterMessage::Sync { sessions } => {
                self.purge_node(&source);
                for info in sessions.into_iter().filter(|info| info.node_id == source) {
                    self.insert_location(info);
                }
                0
            }
        }
    }

    /// Spawns a task that applies every envelope from `receiver`.
    ///
    /// The task ends when the channel closes.
    pub fn spawn_inbound(
        self: &Arc<Self>,
        mut receiver: broadcast::Receiver<ClusterEnvelope>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) => {
                        manager.handle_inbound(envelope);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            node_id = %manager.node_id,
                            lagged = n,
                            "cluster receiver lagged behind hub"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Returns the known owner of `session_id` on `path`.
    #[must_use]
    pub fn locate(&self, path: &str, session_id: &SessionId) -> Option<SessionInfo> {
        self.locations
            .get(path)
            .and_then(|members| members.get(session_id).map(|entry| entry.value().clone()))
    }

    /// Returns every known session on `path`, all nodes included.
    #[must_use]
    pub fn sessions_in_cluster(&self, path: &str) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .locations
            .get(path)
            .map(|members| members.iter().map(|entry| entry.value().clone()).collect())
            .unwrap_or_default();
        sessions.sort_by_key(|info| info.created_at);
        sessions
    }

    /// Returns the number of known sessions on `path`, all nodes included.
    #[must_use]
    pub fn cluster_count(&self, path: &str) -> usize {
        self.locations.get(path).map_or(0, |members| members.len())
    }

    /// Returns a snapshot of the manager's counters.
    #[must_use]
    pub fn stats(&self) -> ClusterStats {
        ClusterStats {
            node_id: self.node_id.to_string(),
            transport: self.transport.name().to_string(),
            published: self.published.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            relayed: self.relayed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            known_sessions: self.locations.iter().map(|entry| entry.value().len()).sum(),
        }
    }

    fn publish(&self, message: ClusterMessage) {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.transport
            .publish(ClusterEnvelope::new(self.node_id.clone(), message));
    }

    fn deliver_broadcast(&self, message: &BroadcastMessage) -> usize {
        let delivered = self.registry.deliver(
            &message.path,
            &message.payload,
            |session| message.selector.matches(session),
            |session| self.tracer.trace_send(session, &message.payload),
        );
        self.relayed.fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    fn deliver_direct(&self, message: DirectMessage) -> usize {
        if message.target_node != self.node_id {
            return 0;
        }
        let delivered = match self.registry.get(&message.session_id) {
            Some(session) if session.path() == message.path => {
                let ok = session.send(message.payload.clone());
                if ok {
                    self.tracer.trace_send(&session, &message.payload);
                }
                ok
            }
            _ => false,
        };
        if delivered {
            self.relayed.fetch_add(1, Ordering::Relaxed);
            1
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                session_id = %message.session_id,
                path = %message.path,
                "direct message for absent session dropped"
            );
            0
        }
    }

    fn insert_location(&self, info: SessionInfo) {
        self.locations
            .entry(info.path.clone())
            .or_default()
            .insert(info.session_id, info);
    }

    fn remove_location(&self, path: &str, session_id: &SessionId, owner: &NodeId) {
        if let Some(members) = self.locations.get(path) {
            members.remove_if(session_id, |_, info| &info.node_id == owner);
        }
        self.locations
            .remove_if(path, |_, members| members.is_empty());
    }

    fn purge_node(&self, node_id: &NodeId) -> usize {
        let mut purged = 0usize;
        for members in self.locations.iter() {
            let before = members.len();
            members.retain(|_, info| &info.node_id != node_id);
            purged = purged.saturating_add(before.saturating_sub(members.len()));
        }
        self.locations.retain(|_, members| !members.is_empty());
        purged
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::net::SocketAddr;

    use super::recording::RecordingTransport;
    use super::*;
    use crate::domain::{OutboundReceiver, Session};
    use crate::telemetry::MetricsTracer;

    struct Node {
        manager: ClusterManager,
        registry: Arc<SessionRegistry>,
        transport: Arc<RecordingTransport>,
    }

    fn node(name: &str) -> Node {
        let registry = Arc::new(SessionRegistry::new());
        let transport = Arc::new(RecordingTransport::default());
        let manager = ClusterManager::new(
            NodeId::new(name),
            Arc::clone(&transport) as Arc<dyn ClusterTransport>,
            Arc::clone(&registry),
            Arc::new(MetricsTracer::new()),
        );
        Node {
            manager,
            registry,
            transport,
        }
    }

    fn connect(node: &Node, path: &str) -> (Arc<Session>, OutboundReceiver) {
        let (session, rx) = Session::new(path, SocketAddr::from(([127, 0, 0, 1], 4000)), None, 8);
        let session = Arc::new(session);
        if node.registry.add(Arc::clone(&session)).is_err() {
            panic!("add failed");
        }
        node.manager.session_added(session.info(node.manager.node_id()));
        (session, rx)
    }

    #[test]
    fn local_facts_are_indexed_and_published() {
        let a = node("a");
        let (session, _rx) = connect(&a, "/chat");
        assert_eq!(a.manager.cluster_count("/chat"), 1);

        let sent = a.transport.take();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent.first().map(|e| &e.message), Some(ClusterMessage::SessionAdded { .. })));

        a.manager.session_removed(session.id(), "/chat");
        assert_eq!(a.manager.cluster_count("/chat"), 0);
        assert_eq!(a.transport.take().len(), 1);
    }

    #[test]
    fn own_envelopes_are_ignored() {
        let a = node("a");
        let (_session, mut rx) = connect(&a, "/chat");
        a.transport.take();

        let own = ClusterEnvelope::new(
            NodeId::new("a"),
            ClusterMessage::Broadcast(BroadcastMessage {
                path: "/chat".to_string(),
                payload: Payload::from("loop"),
                selector: SessionSelector::All,
            }),
        );
        assert_eq!(a.manager.handle_inbound(own), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(a.manager.stats().received, 0);
    }

    #[test]
    fn peer_broadcast_is_delivered_locally_and_never_republished() {
        let nodes = [node("a"), node("b"), node("c")];
        let mut receivers = Vec::new();
        for n in &nodes {
            receivers.push(connect(n, "/chat"));
            n.transport.take();
        }

        let Some(origin) = nodes.first() else {
            panic!("no nodes");
        };
        origin
            .manager
            .publish_broadcast("/chat", Payload::from("ring"), SessionSelector::All);
        let outbound = origin.transport.take();
        assert_eq!(outbound.len(), 1);

        // Ring: every envelope is offered to every other node, and anything
        // they publish in response would be offered again.
        let mut in_flight = outbound;
        let mut rounds = 0;
        while !in_flight.is_empty() && rounds < 5 {
            let mut next = Vec::new();
            for envelope in in_flight {
                for n in &nodes {
                    n.manager.handle_inbound(envelope.clone());
                    next.extend(n.transport.take());
                }
            }
            in_flight = next;
            rounds += 1;
        }

        assert_eq!(rounds, 1, "peers must not re-publish a relayed broadcast");
        for (i, (_session, rx)) in receivers.iter_mut().enumerate() {
            let got = rx.try_recv();
            if i == 0 {
                assert!(got.is_err(), "origin delivers locally through the dispatcher");
            } else {
                assert_eq!(got.ok(), Some(Payload::from("ring")));
                assert!(rx.try_recv().is_err());
            }
        }
    }

    #[test]
    fn selector_is_applied_by_receiving_node() {
        let b = node("b");
        let (keep, mut keep_rx) = connect(&b, "/chat");
        let (_skip, mut skip_rx) = connect(&b, "/chat");

        let envelope = ClusterEnvelope::new(
            NodeId::new("a"),
            ClusterMessage::Broadcast(BroadcastMessage {
                path: "/chat".to_string(),
                payload: Payload::from("only you"),
                selector: SessionSelector::Sessions { ids: vec![keep.id()] },
            }),
        );
        assert_eq!(b.manager.handle_inbound(envelope), 1);
        assert_eq!(keep_rx.try_recv().ok(), Some(Payload::from("only you")));
        assert!(skip_rx.try_recv().is_err());
    }

    #[test]
    fn route_direct_targets_known_owner() {
        let a = node("a");
        let b = node("b");
        let (remote, mut remote_rx) = connect(&b, "/chat");
        for envelope in b.transport.take() {
            a.manager.handle_inbound(envelope);
        }
        assert_eq!(
            a.manager.locate("/chat", &remote.id()).map(|i| i.node_id),
            Some(NodeId::new("b"))
        );

        assert!(a.manager.route_direct("/chat", remote.id(), Payload::from("psst")));
        let sent = a.transport.take();
        assert_eq!(sent.len(), 1);
        for envelope in sent {
            assert_eq!(b.manager.handle_inbound(envelope), 1);
        }
        assert_eq!(remote_rx.try_recv().ok(), Some(Payload::from("psst")));

        assert!(!a.manager.route_direct("/chat", SessionId::new(), Payload::from("x")));
        assert!(a.transport.take().is_empty());
    }

    #[test]
    fn direct_for_absent_session_is_dropped() {
        let b = node("b");
        let envelope = ClusterEnvelope::new(
            NodeId::new("a"),
            ClusterMessage::Direct(DirectMessage {
                path: "/chat".to_string(),
                session_id: SessionId::new(),
                target_node: NodeId::new("b"),
                payload: Payload::from("late"),
            }),
        );
        assert_eq!(b.manager.handle_inbound(envelope), 0);
        assert_eq!(b.manager.stats().dropped, 1);
        assert!(b.transport.take().is_empty());
    }

    #[test]
    fn node_left_purges_its_sessions() {
        let a = node("a");
        let b = node("b");
        let (_s1, _r1) = connect(&b, "/chat");
        let (_s2, _r2) = connect(&b, "/feed");
        for envelope in b.transport.take() {
            a.manager.handle_inbound(envelope);
        }
        assert_eq!(a.manager.stats().known_sessions, 2);

        b.manager.leave();
        for envelope in b.transport.take() {
            a.manager.handle_inbound(envelope);
        }
        assert_eq!(a.manager.stats().known_sessions, 0);
        assert!(a.manager.sessions_in_cluster("/chat").is_empty());
    }

    #[test]
    fn sync_request_is_answered_once() {
        let a = node("a");
        let b = node("b");
        let (_s, _r) = connect(&b, "/chat");
        b.transport.take();

        a.manager.announce();
        for envelope in a.transport.take() {
            b.manager.handle_inbound(envelope);
        }
        let answers = b.transport.take();
        assert_eq!(answers.len(), 1);
        for envelope in answers {
            a.manager.handle_inbound(envelope);
        }
        assert_eq!(a.manager.cluster_count("/chat"), 1);
        assert!(a.transport.take().is_empty(), "sync must not trigger a reply");
    }

    #[tokio::test]
    async fn hub_pump_applies_peer_envelopes() {
        let hub = ClusterHub::new(64);
        let registry = Arc::new(SessionRegistry::new());
        let manager = Arc::new(ClusterManager::new(
            NodeId::new("b"),
            Arc::new(hub.transport()),
            Arc::clone(&registry),
            Arc::new(MetricsTracer::new()),
        ));
        let pump = manager.spawn_inbound(hub.subscribe());

        let (session, mut rx) = Session::new("/chat", SocketAddr::from(([127, 0, 0, 1], 1)), None, 4);
        if registry.add(Arc::new(session)).is_err() {
            panic!("add failed");
        }

        hub.transport().publish(ClusterEnvelope::new(
            NodeId::new("a"),
            ClusterMessage::Broadcast(BroadcastMessage {
                path: "/chat".to_string(),
                payload: Payload::from("via hub"),
                selector: SessionSelector::All,
            }),
        ));

        let received = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv()).await;
        let Ok(Some(payload)) = received else {
            panic!("payload not relayed");
        };
        assert_eq!(payload, Payload::from("via hub"));
        pump.abort();
    }
}
