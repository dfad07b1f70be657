//! Metrics and tracing sink.
//!
//! The gateway calls a [`GatewayTracer`] at fixed points of a session's life
//! (connect, receive, send, error, filter rejection, disconnect) and does
//! not care what the sink does with them. [`MetricsTracer`] is the bundled
//! implementation: it counts every event and logs it through `tracing`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{Payload, Session};
use crate::error::CallbackError;

/// Receiver of session lifecycle and traffic events.
pub trait GatewayTracer: Send + Sync + fmt::Debug {
    /// A session was registered.
    fn trace_connect(&self, session: &Session);

    /// A session was removed.
    fn trace_disconnect(&self, session: &Session);

    /// A payload was queued for `session`.
    fn trace_send(&self, session: &Session, payload: &Payload);

    /// A payload arrived from `session`, before filtering.
    fn trace_receive(&self, session: &Session, payload: &Payload);

    /// A callback or the transport failed for `session`.
    fn trace_error(&self, session: &Session, error: &CallbackError);

    /// An inbound payload was dropped by the named filter.
    fn trace_rejected(&self, _session: &Session, _filter: &str) {}

    /// Returns the counters kept by this tracer, if it keeps any.
    fn counters(&self) -> Option<TraceCounters> {
        None
    }
}

/// Point-in-time copy of [`MetricsTracer`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct TraceCounters {
    /// Sessions connected since startup.
    pub connects: u64,
    /// Sessions disconnected since startup.
    pub disconnects: u64,
    /// Payloads queued to local sessions.
    pub sent: u64,
    /// Payloads received from clients.
    pub received: u64,
    /// Payloads dropped by the filter pipeline.
    pub rejected: u64,
    /// Callback and transport errors.
    pub errors: u64,
}

/// Counting tracer that also logs every event.
#[derive(Debug, Default)]
pub struct MetricsTracer {
    connects: AtomicU64,
    disconnects: AtomicU64,
    sent: AtomicU64,
    received: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU64,
}

impl MetricsTracer {
    /// Creates a tracer with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> TraceCounters {
        TraceCounters {
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

impl GatewayTracer for MetricsTracer {
    fn trace_connect(&self, session: &Session) {
        self.connects.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            session_id = %session.id(),
            path = session.path(),
            remote = %session.remote_addr(),
            identity = session.identity().unwrap_or("-"),
            "session connected"
        );
    }

    fn trace_disconnect(&self, session: &Session) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        tracing::info!(session_id = %session.id(), path = session.path(), "session disconnected");
    }

    fn trace_send(&self, session: &Session, payload: &Payload) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            session_id = %session.id(),
            kind = payload.kind_str(),
            bytes = payload.len(),
            "payload queued"
        );
    }

    fn trace_receive(&self, session: &Session, payload: &Payload) {
        self.received.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            session_id = %session.id(),
            kind = payload.kind_str(),
            bytes = payload.len(),
            "payload received"
        );
    }

    fn trace_error(&self, session: &Session, error: &CallbackError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(session_id = %session.id(), path = session.path(), %error, "session error");
    }

    fn trace_rejected(&self, session: &Session, filter: &str) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session_id = %session.id(), filter, "inbound payload dropped");
    }

    fn counters(&self) -> Option<TraceCounters> {
        Some(self.snapshot())
    }
}
