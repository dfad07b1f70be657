//! OpenAPI document for the admin and peer HTTP surface.

use utoipa::OpenApi;

use crate::api::dto::{
    BroadcastRequest, BroadcastResponse, ClusterSessionsResponse, EndpointDto, HealthResponse,
    MessageBody, PathCount, SendMessageRequest, SendMessageResponse, SessionDto,
    SessionLocationDto, StatsResponse,
};
use crate::api::handlers::{broadcast, cluster, sessions, system};
use crate::cluster::ClusterStats;
use crate::error::{ErrorBody, ErrorResponse};
use crate::telemetry::TraceCounters;

/// Generated OpenAPI specification, served by Swagger UI when the
/// `swagger-ui` feature is enabled.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "relay-gateway", description = "WebSocket messaging gateway admin API"),
    paths(
        system::health_handler,
        system::stats_handler,
        sessions::list_endpoints,
        sessions::get_session,
        sessions::close_session,
        sessions::send_message,
        broadcast::broadcast,
        cluster::cluster_sessions,
        cluster::receive_envelope,
    ),
    components(schemas(
        HealthResponse,
        StatsResponse,
        PathCount,
        TraceCounters,
        ClusterStats,
        EndpointDto,
        SessionDto,
        MessageBody,
        SendMessageRequest,
        SendMessageResponse,
        BroadcastRequest,
        BroadcastResponse,
        SessionLocationDto,
        ClusterSessionsResponse,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "System", description = "Health and statistics"),
        (name = "Endpoints", description = "Registered WebSocket endpoints"),
        (name = "Sessions", description = "Per-session administration"),
        (name = "Messages", description = "Broadcasts"),
        (name = "Cluster", description = "Cluster locations and peer traffic"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/stats",
            "/api/v1/endpoints",
            "/api/v1/sessions/{id}",
            "/api/v1/sessions/{id}/messages",
            "/api/v1/broadcast",
            "/api/v1/cluster/sessions",
            "/internal/cluster",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
