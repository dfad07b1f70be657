//! HTTP server assembly: routes, middleware, and the serve loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{StatusCode, Uri};
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::error::GatewayError;
use crate::handshake::{self, ClientConnection, GuardedListener};
use crate::ws::handler::ws_handler;

/// Builds the full router: admin API, one WebSocket route per registered
/// endpoint, and a JSON 404 for everything else.
pub fn build_app(state: AppState) -> Router {
    let mut ws_routes: Router<AppState> = Router::new();
    for path in state.lifecycle.endpoints().paths() {
        ws_routes = ws_routes.route(&path, get(ws_handler));
    }

    let router = Router::new()
        .merge(api::build_router())
        .merge(ws_routes)
        .fallback(not_found);

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::openapi::ApiDoc::openapi()),
        )
    };

    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            handshake_timeout(&state),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(handshake::release_after_response))
        .with_state(state)
}

fn handshake_timeout(state: &AppState) -> Duration {
    Duration::from_secs(state.config.handshake_timeout_secs.max(1))
}

/// Serves the gateway on `listener` until `shutdown` resolves.
///
/// Each accepted connection holds one of `max_pending_handshakes` slots
/// until it has been answered or upgraded, and is dropped if that takes
/// longer than the handshake timeout.
///
/// # Errors
///
/// Returns the I/O error that stopped the serve loop.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = GuardedListener::new(
        listener,
        Arc::clone(&state.handshake_slots),
        handshake_timeout(&state),
    );
    let app = build_app(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<ClientConnection>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn not_found(uri: Uri) -> GatewayError {
    GatewayError::EndpointNotFound(uri.path().to_string())
}
