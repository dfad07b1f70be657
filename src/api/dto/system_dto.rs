//! Health and statistics DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::cluster::ClusterStats;
use crate::telemetry::TraceCounters;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"healthy"` while the process serves requests.
    pub status: String,
    /// Current server time (RFC 3339).
    pub timestamp: String,
    /// Crate version.
    pub version: String,
    /// This node's identity.
    pub node_id: String,
}

/// Local session count for one path.
#[derive(Debug, Serialize, ToSchema)]
pub struct PathCount {
    /// Endpoint path.
    pub path: String,
    /// Sessions connected to this node.
    pub sessions: usize,
}

/// Response for `GET /stats`.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// This node's identity.
    pub node_id: String,
    /// Seconds since startup.
    pub uptime_secs: i64,
    /// Sessions connected to this node.
    pub sessions_total: usize,
    /// Local sessions per path.
    pub sessions_by_path: Vec<PathCount>,
    /// Handshake slots currently free.
    pub free_handshake_slots: usize,
    /// Traffic counters, when the tracer keeps them.
    pub traffic: Option<TraceCounters>,
    /// Cluster relay counters.
    pub cluster: ClusterStats,
}
