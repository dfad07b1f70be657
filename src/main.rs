//! relay-gateway server entry point.
//!
//! Loads configuration, registers the demo `/chat` echo endpoint, and
//! serves WebSocket and admin HTTP traffic until Ctrl-C or SIGTERM.

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use relay_gateway::app_state::{AppState, GatewayBuilder};
use relay_gateway::config::GatewayConfig;
use relay_gateway::domain::CloseReason;
use relay_gateway::endpoint::EndpointCallbacks;
use relay_gateway::server;

const SHUTDOWN_GRACE_MS: u64 = 500;

fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if config.worker_threads > 0 {
        runtime.worker_threads(config.worker_threads);
    }
    runtime.build()?.block_on(run(config))
}

async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    tracing::info!(
        addr = %config.listen_addr,
        node_id = %config.node_id,
        peers = config.cluster_peers.len(),
        "starting relay-gateway"
    );
    let listen_addr = config.listen_addr;

    // Build application state
    let state = GatewayBuilder::new(config).build(|dispatcher, table| {
        let dispatcher = dispatcher.clone();
        table.endpoint(
            "/chat",
            EndpointCallbacks::new()
                .on_open(|session| {
                    tracing::debug!(session_id = %session.id(), "chat session joined");
                    Ok(())
                })
                .on_message(move |session, text| {
                    dispatcher.broadcast(session.path(), format!("echo: {text}"));
                    Ok(())
                }),
        )
    })?;
    state.cluster().announce();

    // Start server
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listen_addr, "server listening");

    let draining = state.clone();
    server::serve(listener, state, async move {
        shutdown_signal().await;
        drain(&draining);
    })
    .await?;

    // Connection tasks and peer deliveries flush after the accept loop stops.
    tokio::time::sleep(Duration::from_millis(SHUTDOWN_GRACE_MS)).await;
    tracing::info!("gateway stopped");
    Ok(())
}

/// Closes every local session and tells peers this node is gone.
fn drain(state: &AppState) {
    let closed = state.lifecycle.close_all(&CloseReason::going_away());
    state.cluster().leave();
    tracing::info!(closed, "local sessions closed");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
