//! Shared application state injected into all Axum handlers, and the
//! builder that wires the gateway components together.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use crate::auth::{Authenticator, PermitAll, StaticTokenAuthenticator};
use crate::cluster::{ClusterManager, ClusterTransport, HttpPeerTransport, StandaloneTransport};
use crate::config::GatewayConfig;
use crate::domain::SessionRegistry;
use crate::endpoint::{EndpointTable, EndpointTableBuilder};
use crate::error::GatewayError;
use crate::filter::FilterPipeline;
use crate::service::{MessageDispatcher, SessionLifecycle};
use crate::telemetry::{GatewayTracer, MetricsTracer};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Immutable startup configuration.
    pub config: Arc<GatewayConfig>,
    /// Session open/inbound/close orchestration.
    pub lifecycle: SessionLifecycle,
    /// Send API shared with application callbacks.
    pub dispatcher: MessageDispatcher,
    /// Handshake check.
    pub authenticator: Arc<dyn Authenticator>,
    /// Slots for handshakes accepted but not yet upgraded.
    pub handshake_slots: Arc<Semaphore>,
    /// When this node started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Returns the cluster manager.
    #[must_use]
    pub fn cluster(&self) -> &Arc<ClusterManager> {
        self.lifecycle.cluster()
    }
}

/// Assembles an [`AppState`] from configuration and optional overrides.
///
/// Without overrides the transport, authenticator and tracer are derived
/// from the configuration: HTTP peers when `cluster_peers` is set,
/// static tokens when `auth_tokens` is set, and a [`MetricsTracer`].
///
/// ```
/// use relay_gateway::app_state::GatewayBuilder;
/// use relay_gateway::config::GatewayConfig;
/// use relay_gateway::endpoint::EndpointCallbacks;
///
/// let state = GatewayBuilder::new(GatewayConfig::default())
///     .build(|dispatcher, table| {
///         let dispatcher = dispatcher.clone();
///         table.endpoint(
///             "/chat",
///             EndpointCallbacks::new().on_message(move |session, text| {
///                 dispatcher.broadcast(session.path(), format!("echo: {text}"));
///                 Ok(())
///             }),
///         )
///     });
/// assert!(state.is_ok());
/// ```
pub struct GatewayBuilder {
    config: GatewayConfig,
    transport: Option<Arc<dyn ClusterTransport>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    tracer: Option<Arc<dyn GatewayTracer>>,
}

impl fmt::Debug for GatewayBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayBuilder")
            .field("node_id", &self.config.node_id)
            .field("transport", &self.transport.as_ref().map(|t| t.name()))
            .finish_non_exhaustive()
    }
}

impl GatewayBuilder {
    /// Starts a builder from the given configuration.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            transport: None,
            authenticator: None,
            tracer: None,
        }
    }

    /// Uses `transport` instead of the one derived from configuration.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn ClusterTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses `authenticator` instead of the one derived from configuration.
    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Uses `tracer` instead of a [`MetricsTracer`].
    #[must_use]
    pub fn tracer(mut self, tracer: Arc<dyn GatewayTracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Wires every component. `register` receives the dispatcher so the
    /// endpoint callbacks it adds can send messages.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidEndpointPath`] or
    /// [`GatewayError::DuplicateEndpoint`] for a bad endpoint table, and
    /// [`GatewayError::InvalidConfig`] for an invalid denylist pattern or
    /// peer client configuration.
    pub fn build<F>(self, register: F) -> Result<AppState, GatewayError>
    where
        F: FnOnce(&MessageDispatcher, EndpointTableBuilder) -> EndpointTableBuilder,
    {
        let config = self.config;
        let tracer = self
            .tracer
            .unwrap_or_else(|| Arc::new(MetricsTracer::new()));
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&config)?,
        };
        let authenticator = self
            .authenticator
            .unwrap_or_else(|| default_authenticator(&config));

        let registry = Arc::new(SessionRegistry::new());
        let cluster = Arc::new(ClusterManager::new(
            config.node_id.clone(),
            transport,
            Arc::clone(&registry),
            Arc::clone(&tracer),
        ));
        let dispatcher =
            MessageDispatcher::new(Arc::clone(&registry), Arc::clone(&cluster), Arc::clone(&tracer));
        let endpoints = register(&dispatcher, EndpointTable::builder()).build()?;
        let filters = FilterPipeline::from_config(&config)?;

        tracing::info!(
            node_id = %config.node_id,
            endpoints = ?endpoints.paths(),
            filters = ?filters.names(),
            transport = %cluster.stats().transport,
            "gateway assembled"
        );

        let lifecycle = SessionLifecycle::new(
            registry,
            cluster,
            Arc::new(endpoints),
            Arc::new(filters),
            tracer,
        );
        Ok(AppState {
            handshake_slots: Arc::new(Semaphore::new(config.max_pending_handshakes.max(1))),
            config: Arc::new(config),
            lifecycle,
            dispatcher,
            authenticator,
            started_at: Utc::now(),
        })
    }
}

fn default_transport(config: &GatewayConfig) -> Result<Arc<dyn ClusterTransport>, GatewayError> {
    if config.cluster_peers.is_empty() {
        return Ok(Arc::new(StandaloneTransport));
    }
    if config.cluster_secret.as_deref().is_none_or(str::is_empty) {
        return Err(GatewayError::InvalidConfig(
            "CLUSTER_PEERS requires CLUSTER_SECRET".to_string(),
        ));
    }
    let transport = HttpPeerTransport::new(
        config.cluster_peers.clone(),
        config.cluster_secret.clone(),
        Duration::from_millis(config.cluster_timeout_ms),
    )?;
    Ok(Arc::new(transport))
}

fn default_authenticator(config: &GatewayConfig) -> Arc<dyn Authenticator> {
    if config.auth_tokens.is_empty() {
        Arc::new(PermitAll)
    } else {
        Arc::new(StaticTokenAuthenticator::new(config.auth_tokens.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointCallbacks;

    #[test]
    fn derives_components_from_config() {
        let config = GatewayConfig {
            auth_tokens: vec![("t".to_string(), None)],
            max_pending_handshakes: 3,
            ..GatewayConfig::default()
        };
        let Ok(state) = GatewayBuilder::new(config)
            .build(|_, table| table.endpoint("/chat", EndpointCallbacks::new()))
        else {
            panic!("build failed");
        };
        assert_eq!(state.cluster().stats().transport, "standalone");
        assert_eq!(state.handshake_slots.available_permits(), 3);
        assert_eq!(state.lifecycle.endpoints().paths(), vec!["/chat".to_string()]);
        assert!(format!("{:?}", state.authenticator).contains("StaticTokenAuthenticator"));
    }

    #[test]
    fn invalid_endpoint_table_fails_build() {
        let result = GatewayBuilder::new(GatewayConfig::default())
            .build(|_, table| table.endpoint("no-slash", EndpointCallbacks::new()));
        assert!(matches!(result, Err(GatewayError::InvalidEndpointPath(_))));
    }

    #[test]
    fn cluster_peers_require_a_secret() {
        let peers = vec!["http://10.0.0.2:8080".to_string()];
        let config = GatewayConfig {
            cluster_peers: peers.clone(),
            ..GatewayConfig::default()
        };
        let result = GatewayBuilder::new(config).build(|_, table| table);
        assert!(matches!(result, Err(GatewayError::InvalidConfig(_))));

        let config = GatewayConfig {
            cluster_peers: peers,
            cluster_secret: Some("s3cret".to_string()),
            ..GatewayConfig::default()
        };
        let Ok(state) = GatewayBuilder::new(config).build(|_, table| table) else {
            panic!("build failed");
        };
        assert_eq!(state.cluster().stats().transport, "http");
    }

    #[test]
    fn invalid_denylist_fails_build() {
        let config = GatewayConfig {
            content_denylist: vec!["(".to_string()],
            ..GatewayConfig::default()
        };
        let result = GatewayBuilder::new(config).build(|_, table| table);
        assert!(matches!(result, Err(GatewayError::InvalidConfig(_))));
    }
}
