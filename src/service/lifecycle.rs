//! Session lifecycle: open, inbound, close.

use std::sync::Arc;

use crate::cluster::ClusterManager;
use crate::domain::{CloseReason, Payload, Session, SessionId, SessionRegistry};
use crate::endpoint::{DispatchOutcome, EndpointTable};
use crate::error::{CallbackError, GatewayError};
use crate::filter::{FilterPipeline, FilterVerdict};
use crate::telemetry::GatewayTracer;

/// Drives a session through registration, inbound dispatch and removal.
///
/// Registry removal is the single point of truth for closing: whichever
/// caller removes the session performs every close side effect, and any
/// later or concurrent caller is a no-op. This keeps the
/// "session removed" fact, the trace and `on_close` to exactly one each.
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    registry: Arc<SessionRegistry>,
    cluster: Arc<ClusterManager>,
    endpoints: Arc<EndpointTable>,
    filters: Arc<FilterPipeline>,
    tracer: Arc<dyn GatewayTracer>,
}

impl SessionLifecycle {
    /// Creates the lifecycle service.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        cluster: Arc<ClusterManager>,
        endpoints: Arc<EndpointTable>,
        filters: Arc<FilterPipeline>,
        tracer: Arc<dyn GatewayTracer>,
    ) -> Self {
        Self {
            registry,
            cluster,
            endpoints,
            filters,
            tracer,
        }
    }

    /// Returns the local session registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Returns the cluster manager.
    #[must_use]
    pub const fn cluster(&self) -> &Arc<ClusterManager> {
        &self.cluster
    }

    /// Returns the endpoint table.
    #[must_use]
    pub const fn endpoints(&self) -> &Arc<EndpointTable> {
        &self.endpoints
    }

    /// Returns the inbound filter pipeline.
    #[must_use]
    pub const fn filters(&self) -> &Arc<FilterPipeline> {
        &self.filters
    }

    /// Returns the tracer.
    #[must_use]
    pub const fn tracer(&self) -> &Arc<dyn GatewayTracer> {
        &self.tracer
    }

    /// Registers a freshly accepted session, publishes its location and
    /// fires `on_open`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DuplicateSession`] if the id is already
    /// registered; nothing else happens in that case.
    pub fn open(&self, session: Arc<Session>) -> Result<(), GatewayError> {
        self.registry.add(Arc::clone(&session))?;
        self.cluster.session_added(session.info(self.cluster.node_id()));
        self.tracer.trace_connect(&session);

        if let Some(endpoint) = self.endpoints.get(session.path())
            && let DispatchOutcome::Failed(error) = endpoint.dispatch_open(&session)
        {
            self.tracer.trace_error(&session, &error);
        }
        Ok(())
    }

    /// Runs one inbound payload through the filters and, if it passes, the
    /// endpoint's message callback.
    ///
    /// Returns `None` without touching filters or callbacks when the session
    /// has already been closed.
    pub fn inbound(&self, session: &Arc<Session>, payload: Payload) -> Option<FilterVerdict> {
        if !self.is_registered(session) {
            tracing::debug!(session_id = %session.id(), "inbound message after close ignored");
            return None;
        }
        self.tracer.trace_receive(session, &payload);
        let verdict = self.filters.evaluate(session, &payload);
        if !self.is_registered(session) {
            // Closed while filtering: drop any state the filters just recreated.
            self.filters.session_closed(&session.id());
            return None;
        }
        if let FilterVerdict::Reject { filter } = verdict {
            self.tracer.trace_rejected(session, filter);
            tracing::debug!(
                session_id = %session.id(),
                path = session.path(),
                filter,
                len = payload.len(),
                "inbound message dropped by filter"
            );
            return Some(verdict);
        }

        if let Some(endpoint) = self.endpoints.get(session.path())
            && let DispatchOutcome::Failed(error) = endpoint.dispatch_message(session, &payload)
        {
            self.tracer.trace_error(session, &error);
        }
        Some(verdict)
    }

    fn is_registered(&self, session: &Session) -> bool {
        session.is_open() && self.registry.get(&session.id()).is_some()
    }

    /// Removes and closes a session.
    ///
    /// Returns `true` for the one caller that actually removed it. Unknown
    /// or already closed ids are a no-op returning `false`.
    pub fn close(&self, session_id: &SessionId, reason: CloseReason) -> bool {
        let Some(session) = self.registry.remove(session_id) else {
            return false;
        };
        session.close(reason.clone());
        self.filters.session_closed(session_id);
        self.cluster.session_removed(*session_id, session.path());
        self.tracer.trace_disconnect(&session);
        tracing::debug!(
            session_id = %session_id,
            code = reason.code,
            reason = %reason.reason,
            "close frame scheduled"
        );

        if let Some(endpoint) = self.endpoints.get(session.path())
            && let DispatchOutcome::Failed(error) = endpoint.dispatch_close(&session)
        {
            self.tracer.trace_error(&session, &error);
        }
        true
    }

    /// Routes a transport or protocol error to `on_error` and the tracer.
    /// The session stays open; the caller decides whether to close it.
    pub fn report_error(&self, session: &Arc<Session>, error: &CallbackError) {
        self.tracer.trace_error(session, error);
        if let Some(endpoint) = self.endpoints.get(session.path()) {
            endpoint.dispatch_error(session, error);
        }
    }

    /// Closes every local session with `reason`. Returns how many were
    /// closed by this call.
    pub fn close_all(&self, reason: &CloseReason) -> usize {
        self.registry
            .all()
            .iter()
            .filter(|session| self.close(&session.id(), reason.clone()))
            .count()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::cluster::recording::RecordingTransport;
    use crate::cluster::{ClusterMessage, ClusterTransport};
    use crate::domain::{NodeId, OutboundReceiver};
    use crate::endpoint::EndpointCallbacks;
    use crate::filter::{MessageFilter, RateLimitFilter, SizeLimitFilter};
    use crate::telemetry::MetricsTracer;

    #[derive(Debug, Default)]
    struct Calls {
        open: AtomicUsize,
        close: AtomicUsize,
        errors: AtomicUsize,
        messages: Mutex<Vec<String>>,
    }

    struct Fixture {
        lifecycle: SessionLifecycle,
        transport: Arc<RecordingTransport>,
        tracer: Arc<MetricsTracer>,
        rate: Arc<RateLimitFilter>,
        calls: Arc<Calls>,
    }

    fn fixture() -> Fixture {
        let calls = Arc::new(Calls::default());
        let (c_open, c_close, c_msg, c_err) = (
            Arc::clone(&calls),
            Arc::clone(&calls),
            Arc::clone(&calls),
            Arc::clone(&calls),
        );
        let callbacks = EndpointCallbacks::new()
            .on_open(move |_| {
                c_open.open.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .on_message(move |_, text| {
                if text == "boom" {
                    return Err(CallbackError::failed("boom"));
                }
                if let Ok(mut messages) = c_msg.messages.lock() {
                    messages.push(text.to_string());
                }
                Ok(())
            })
            .on_close(move |_| {
                c_close.close.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .on_error(move |_, _| {
                c_err.errors.fetch_add(1, Ordering::SeqCst);
            });
        let Ok(endpoints) = EndpointTable::builder().endpoint("/chat", callbacks).build() else {
            panic!("valid table");
        };

        let registry = Arc::new(SessionRegistry::new());
        let transport = Arc::new(RecordingTransport::default());
        let tracer = Arc::new(MetricsTracer::new());
        let cluster = Arc::new(ClusterManager::new(
            NodeId::new("local"),
            Arc::clone(&transport) as Arc<dyn ClusterTransport>,
            Arc::clone(&registry),
            Arc::clone(&tracer) as Arc<dyn GatewayTracer>,
        ));
        let rate = Arc::new(RateLimitFilter::new(100, Duration::from_secs(1)));
        let filters = FilterPipeline::new(vec![
            Arc::new(SizeLimitFilter::new(8)) as Arc<dyn MessageFilter>,
            Arc::clone(&rate) as Arc<dyn MessageFilter>,
        ]);
        let lifecycle = SessionLifecycle::new(
            registry,
            cluster,
            Arc::new(endpoints),
            Arc::new(filters),
            Arc::clone(&tracer) as Arc<dyn GatewayTracer>,
        );
        Fixture {
            lifecycle,
            transport,
            tracer,
            rate,
            calls,
        }
    }

    fn session() -> (Arc<Session>, OutboundReceiver) {
        let (session, rx) = Session::new("/chat", SocketAddr::from(([127, 0, 0, 1], 2000)), None, 8);
        (Arc::new(session), rx)
    }

    fn removed_facts(sent: &[crate::cluster::ClusterEnvelope]) -> usize {
        sent.iter()
            .filter(|e| matches!(e.message, ClusterMessage::SessionRemoved { .. }))
            .count()
    }

    #[test]
    fn open_registers_publishes_and_fires_callback() {
        let f = fixture();
        let (s, _rx) = session();
        assert!(f.lifecycle.open(Arc::clone(&s)).is_ok());

        assert!(f.lifecycle.registry().get(&s.id()).is_some());
        assert_eq!(f.calls.open.load(Ordering::SeqCst), 1);
        assert_eq!(f.tracer.snapshot().connects, 1);
        let sent = f.transport.take();
        assert!(matches!(
            sent.first().map(|e| &e.message),
            Some(ClusterMessage::SessionAdded { .. })
        ));
    }

    #[test]
    fn close_twice_emits_one_removed_fact() {
        let f = fixture();
        let (s, _rx) = session();
        assert!(f.lifecycle.open(Arc::clone(&s)).is_ok());
        f.transport.take();

        assert!(f.lifecycle.close(&s.id(), CloseReason::normal()));
        assert!(!f.lifecycle.close(&s.id(), CloseReason::going_away()));

        assert_eq!(removed_facts(&f.transport.take()), 1);
        assert_eq!(f.calls.close.load(Ordering::SeqCst), 1);
        assert_eq!(f.tracer.snapshot().disconnects, 1);
        assert!(!s.is_open());
        assert_eq!(s.close_reason(), CloseReason::normal());
        assert_eq!(f.lifecycle.registry().count_for("/chat"), 0);
    }

    #[test]
    fn concurrent_close_emits_one_removed_fact() {
        let f = fixture();
        let (s, _rx) = session();
        assert!(f.lifecycle.open(Arc::clone(&s)).is_ok());
        f.transport.take();

        let id = s.id();
        let wins = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| f.lifecycle.close(&id, CloseReason::normal())))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join())
                .filter(|r| matches!(r, Ok(true)))
                .count()
        });
        assert_eq!(wins, 1);
        assert_eq!(removed_facts(&f.transport.take()), 1);
        assert_eq!(f.calls.close.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn inbound_runs_filters_before_dispatch() {
        let f = fixture();
        let (s, _rx) = session();
        assert!(f.lifecycle.open(Arc::clone(&s)).is_ok());

        assert_eq!(
            f.lifecycle.inbound(&s, Payload::from("hello")),
            Some(FilterVerdict::Pass)
        );
        assert_eq!(
            f.lifecycle.inbound(&s, Payload::from("much too long")),
            Some(FilterVerdict::Reject { filter: "size" })
        );

        let Ok(messages) = f.calls.messages.lock() else {
            panic!("poisoned");
        };
        assert_eq!(*messages, vec!["hello".to_string()]);
        let counters = f.tracer.snapshot();
        assert_eq!(counters.received, 2);
        assert_eq!(counters.rejected, 1);
        assert!(s.is_open(), "a filter rejection never closes the session");
    }

    #[test]
    fn inbound_after_close_is_ignored() {
        let f = fixture();
        let (s, _rx) = session();
        assert!(f.lifecycle.open(Arc::clone(&s)).is_ok());
        assert!(f.lifecycle.inbound(&s, Payload::from("hi")).is_some());
        assert_eq!(f.rate.tracked_sessions(), 1);

        assert!(f.lifecycle.close(&s.id(), CloseReason::normal()));
        assert_eq!(f.rate.tracked_sessions(), 0);

        assert_eq!(f.lifecycle.inbound(&s, Payload::from("late")), None);
        assert_eq!(f.rate.tracked_sessions(), 0);
        assert_eq!(f.tracer.snapshot().received, 1);
        let Ok(messages) = f.calls.messages.lock() else {
            panic!("poisoned");
        };
        assert_eq!(*messages, vec!["hi".to_string()]);
    }

    #[test]
    fn callback_failure_reaches_on_error_and_keeps_session() {
        let f = fixture();
        let (s, _rx) = session();
        assert!(f.lifecycle.open(Arc::clone(&s)).is_ok());

        assert_eq!(
            f.lifecycle.inbound(&s, Payload::from("boom")),
            Some(FilterVerdict::Pass)
        );
        assert_eq!(f.calls.errors.load(Ordering::SeqCst), 1);
        assert_eq!(f.tracer.snapshot().errors, 1);
        assert!(s.is_open());
        assert!(f.lifecycle.registry().get(&s.id()).is_some());
    }

    #[test]
    fn report_error_routes_to_on_error() {
        let f = fixture();
        let (s, _rx) = session();
        assert!(f.lifecycle.open(Arc::clone(&s)).is_ok());
        f.lifecycle
            .report_error(&s, &CallbackError::Transport("reset".to_string()));
        assert_eq!(f.calls.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_all_closes_everything_once() {
        let f = fixture();
        let sessions: Vec<_> = (0..3).map(|_| session()).collect();
        for (s, _) in &sessions {
            assert!(f.lifecycle.open(Arc::clone(s)).is_ok());
        }
        f.transport.take();

        assert_eq!(f.lifecycle.close_all(&CloseReason::going_away()), 3);
        assert_eq!(f.lifecycle.close_all(&CloseReason::going_away()), 0);
        assert_eq!(removed_facts(&f.transport.take()), 3);
        for (s, _) in &sessions {
            assert_eq!(s.close_reason(), CloseReason::going_away());
        }
    }
}
