//! Outward-facing send API used by application code.

use std::sync::Arc;

use crate::cluster::{ClusterManager, SessionSelector};
use crate::domain::{Payload, Session, SessionId, SessionRegistry};
use crate::telemetry::GatewayTracer;

/// Unicast and broadcast to sessions, cluster-aware.
///
/// Sends to one session keep call order because every payload goes through
/// that session's own outbound queue. Nothing is guaranteed across
/// sessions or across nodes.
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    registry: Arc<SessionRegistry>,
    cluster: Arc<ClusterManager>,
    tracer: Arc<dyn GatewayTracer>,
}

impl MessageDispatcher {
    /// Creates a dispatcher over the local registry and the cluster.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        cluster: Arc<ClusterManager>,
        tracer: Arc<dyn GatewayTracer>,
    ) -> Self {
        Self {
            registry,
            cluster,
            tracer,
        }
    }

    /// Sends to one session on `path`.
    ///
    /// Returns `true` only if this node delivered the payload. When the
    /// session is not local, the cluster is asked to forward it to the
    /// owning node and `false` is returned: remote delivery is never
    /// confirmed.
    pub fn send_to_session(
        &self,
        path: &str,
        session_id: &SessionId,
        payload: impl Into<Payload>,
    ) -> bool {
        let payload = payload.into();
        match self.registry.get(session_id) {
            Some(session) if session.path() == path => self.send_local(&session, payload),
            Some(session) => {
                tracing::debug!(
                    session_id = %session_id,
                    path,
                    actual = session.path(),
                    "session is bound to another path"
                );
                false
            }
            None => {
                self.cluster.route_direct(path, *session_id, payload);
                false
            }
        }
    }

    /// Delivers to every local session on `path` and asks peers to do the
    /// same for theirs. Returns the number of local deliveries.
    pub fn broadcast(&self, path: &str, payload: impl Into<Payload>) -> usize {
        self.broadcast_matching(path, payload, SessionSelector::All)
    }

    /// Delivers to local sessions on `path` accepted by `predicate`. Never
    /// leaves this node.
    pub fn broadcast_local<P>(&self, path: &str, payload: impl Into<Payload>, predicate: P) -> usize
    where
        P: Fn(&Session) -> bool,
    {
        let payload = payload.into();
        self.registry.deliver(path, &payload, predicate, |session| {
            self.tracer.trace_send(session, &payload);
        })
    }

    /// Cluster-wide broadcast filtered by `selector`, which every node
    /// evaluates against its own sessions. Returns the number of local
    /// deliveries.
    pub fn broadcast_matching(
        &self,
        path: &str,
        payload: impl Into<Payload>,
        selector: SessionSelector,
    ) -> usize {
        let payload = payload.into();
        let delivered = self.registry.deliver(
            path,
            &payload,
            |session| selector.matches(session),
            |session| self.tracer.trace_send(session, &payload),
        );
        self.cluster.publish_broadcast(path, payload, selector);
        delivered
    }

    /// Returns the number of sessions on `path` connected to this node.
    #[must_use]
    pub fn session_count(&self, path: &str) -> usize {
        self.registry.count_for(path)
    }

    /// Returns the number of sessions on `path` known across the cluster.
    #[must_use]
    pub fn cluster_session_count(&self, path: &str) -> usize {
        self.cluster.cluster_count(path)
    }

    fn send_local(&self, session: &Session, payload: Payload) -> bool {
        let sent = session.send(payload.clone());
        if sent {
            self.tracer.trace_send(session, &payload);
        }
        sent
    }
}
