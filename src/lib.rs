//! # relay-gateway
//!
//! Real-time WebSocket messaging gateway.
//!
//! Clients connect to registered endpoint paths over a standard WebSocket
//! upgrade. Inbound frames pass an ordered filter pipeline and reach the
//! application callbacks registered for the path; application code pushes
//! messages back to one session, a filtered subset, or every session on a
//! path, including sessions connected to other gateway nodes.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)          Admin / peers (HTTP)
//!     │                            │
//!     ├── GuardedListener (handshake): slot per accepted connection
//!     │                            │
//!     ├── WS Handler (ws/)         ├── REST Handlers (api/)
//!     │     └── Authenticator      │
//!     │                            │
//!     ├── SessionLifecycle ────────┼── MessageDispatcher (service/)
//!     │     ├── FilterPipeline (filter/)
//!     │     └── EndpointTable (endpoint/)
//!     │
//!     ├── SessionRegistry (domain/)
//!     │
//!     └── ClusterManager (cluster/)
//!           └── ClusterTransport: standalone | hub | http peers
//! ```
//!
//! ## Embedding
//!
//! ```no_run
//! use relay_gateway::app_state::GatewayBuilder;
//! use relay_gateway::config::GatewayConfig;
//! use relay_gateway::endpoint::EndpointCallbacks;
//! use relay_gateway::server;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = GatewayConfig::from_env()?;
//! let listen_addr = config.listen_addr;
//! let state = GatewayBuilder::new(config).build(|dispatcher, table| {
//!     let dispatcher = dispatcher.clone();
//!     table.endpoint(
//!         "/chat",
//!         EndpointCallbacks::new().on_message(move |session, text| {
//!             dispatcher.broadcast(session.path(), format!("echo: {text}"));
//!             Ok(())
//!         }),
//!     )
//! })?;
//! let listener = tokio::net::TcpListener::bind(listen_addr).await?;
//! server::serve(listener, state, std::future::pending()).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod app_state;
pub mod auth;
pub mod cluster;
pub mod config;
pub mod domain;
pub mod endpoint;
pub mod error;
pub mod filter;
pub mod handshake;
pub mod server;
pub mod service;
pub mod telemetry;
pub mod ws;
