//! One live client connection and its outbound send handle.
//!
//! A [`Session`] carries no business state. It knows who it is, which
//! endpoint it is bound to, and how to enqueue frames for the connection
//! task that owns the socket. Frames are drained in order by that task, so
//! consecutive sends to one session are delivered in call order.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, mpsc};

use super::{NodeId, Payload, SessionId, SessionInfo};

/// WebSocket close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// WebSocket close code sent when the gateway is shutting down.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// WebSocket close code for a policy violation (administrative kick).
pub const CLOSE_POLICY: u16 = 1008;
/// WebSocket close code for an unexpected server condition.
pub const CLOSE_INTERNAL: u16 = 1011;

/// Close code and reason sent to the client when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code.
    pub code: u16,
    /// Human-readable reason (kept short, it travels in the close frame).
    pub reason: String,
}

impl CloseReason {
    /// Normal closure (1000).
    #[must_use]
    pub fn normal() -> Self {
        Self {
            code: CLOSE_NORMAL,
            reason: String::new(),
        }
    }

    /// Server shutdown (1001).
    #[must_use]
    pub fn going_away() -> Self {
        Self {
            code: CLOSE_GOING_AWAY,
            reason: "server shutting down".to_string(),
        }
    }

    /// Administrative force-close (1008).
    #[must_use]
    pub fn policy(reason: impl Into<String>) -> Self {
        Self {
            code: CLOSE_POLICY,
            reason: reason.into(),
        }
    }

    /// Server-side failure (1011).
    #[must_use]
    pub fn internal(reason: impl Into<String>) -> Self {
        Self {
            code: CLOSE_INTERNAL,
            reason: reason.into(),
        }
    }
}

/// Receiving half of a session's outbound queue, owned by the connection
/// task.
pub type OutboundReceiver = mpsc::Receiver<Payload>;

/// The gateway's handle to one live client connection.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    path: String,
    remote_addr: SocketAddr,
    identity: Option<String>,
    created_at: DateTime<Utc>,
    outbound: mpsc::Sender<Payload>,
    closed: AtomicBool,
    close_reason: OnceLock<CloseReason>,
    close_signal: Notify,
}

impl Session {
    /// Creates a new session with a fresh id and a bounded outbound queue
    /// of `capacity` frames.
    ///
    /// Returns the session together with the receiving end of its queue,
    /// which the connection task drains onto the socket.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        remote_addr: SocketAddr,
        identity: Option<String>,
        capacity: usize,
    ) -> (Self, OutboundReceiver) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let session = Self {
            id: SessionId::new(),
            path: path.into(),
            remote_addr,
            identity,
            created_at: Utc::now(),
            outbound,
            closed: AtomicBool::new(false),
            close_reason: OnceLock::new(),
            close_signal: Notify::new(),
        };
        (session, rx)
    }

    /// Returns the session id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the endpoint path this session is bound to.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the client's remote address.
    #[must_use]
    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Returns the identity established by the authenticator, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Returns when the session was accepted.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns `true` until [`Session::close`] has been called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Enqueues a payload for delivery.
    ///
    /// Never blocks. Returns `false` if the session is closed or its
    /// outbound queue is full.
    pub fn send(&self, payload: Payload) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.outbound.try_send(payload) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(session_id = %self.id, path = %self.path, "outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Enqueues a text frame.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Payload::Text(text.into()))
    }

    /// Enqueues a binary frame.
    pub fn send_binary(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.send(Payload::Binary(bytes.into()))
    }

    /// Marks the session closed and wakes the connection task so it sends
    /// a close frame and drops the socket.
    ///
    /// Idempotent: only the first call returns `true`, and only its reason
    /// is sent to the client.
    pub fn close(&self, reason: CloseReason) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.close_reason.set(reason);
        self.close_signal.notify_one();
        true
    }

    /// Resolves once [`Session::close`] has been called.
    pub async fn closed(&self) {
        if !self.is_open() {
            return;
        }
        self.close_signal.notified().await;
    }

    /// Returns the reason passed to the first [`Session::close`] call, or a
    /// normal closure if the session is still open.
    #[must_use]
    pub fn close_reason(&self) -> CloseReason {
        self.close_reason
            .get()
            .cloned()
            .unwrap_or_else(CloseReason::normal)
    }

    /// Returns the cluster-visible snapshot of this session.
    #[must_use]
    pub fn info(&self, node_id: &NodeId) -> SessionInfo {
        SessionInfo {
            session_id: self.id,
            path: self.path.clone(),
            node_id: node_id.clone(),
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40_000))
    }

    #[test]
    fn sends_arrive_in_call_order() {
        let (session, mut rx) = Session::new("/chat", addr(), None, 8);
        assert!(session.send_text("one"));
        assert!(session.send_text("two"));
        assert!(session.send_binary(vec![3u8]));

        assert_eq!(rx.try_recv().ok(), Some(Payload::from("one")));
        assert_eq!(rx.try_recv().ok(), Some(Payload::from("two")));
        assert_eq!(rx.try_recv().ok(), Some(Payload::from(vec![3u8])));
    }

    #[test]
    fn close_is_idempotent_and_keeps_first_reason() {
        let (session, _rx) = Session::new("/chat", addr(), None, 8);
        assert!(session.close(CloseReason::policy("kicked")));
        assert!(!session.close(CloseReason::going_away()));
        assert!(!session.is_open());
        assert_eq!(session.close_reason(), CloseReason::policy("kicked"));
    }

    #[tokio::test]
    async fn closed_resolves_after_close() {
        let (session, _rx) = Session::new("/chat", addr(), None, 8);
        let session = std::sync::Arc::new(session);
        let waiter = {
            let session = std::sync::Arc::clone(&session);
            tokio::spawn(async move { session.closed().await })
        };
        session.close(CloseReason::normal());
        let joined = tokio::time::timeout(std::time::Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[test]
    fn closed_stays_pending_until_close() {
        let (session, _rx) = Session::new("/chat", addr(), None, 8);
        let mut waiter = tokio_test::task::spawn(session.closed());
        tokio_test::assert_pending!(waiter.poll());
        session.close(CloseReason::internal("boom"));
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[test]
    fn send_after_close_is_refused() {
        let (session, _rx) = Session::new("/chat", addr(), None, 8);
        session.close(CloseReason::going_away());
        assert!(!session.send_text("late"));
    }

    #[test]
    fn full_queue_drops_message() {
        let (session, _rx) = Session::new("/chat", addr(), None, 1);
        assert!(session.send_text("fits"));
        assert!(!session.send_text("overflow"));
    }

    #[test]
    fn info_projects_identity_fields() {
        let (session, _rx) = Session::new("/feed", addr(), Some("alice".to_string()), 4);
        let info = session.info(&NodeId::new("node-1"));
        assert_eq!(info.session_id, session.id());
        assert_eq!(info.path, "/feed");
        assert_eq!(info.node_id.as_str(), "node-1");
        assert_eq!(session.identity(), Some("alice"));
    }
}
