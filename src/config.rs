//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). The configuration is read once at
//! startup and treated as immutable afterwards.

use std::net::SocketAddr;

use crate::domain::NodeId;

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP/WebSocket listener to.
    pub listen_addr: SocketAddr,

    /// Cluster identity of this process.
    pub node_id: NodeId,

    /// Tokio worker threads (0 = runtime default).
    pub worker_threads: usize,

    /// Maximum WebSocket frame and message size accepted by the transport.
    pub max_frame_size: usize,

    /// Size filter limit in bytes (0 disables the filter).
    pub max_message_bytes: usize,

    /// Rate filter budget in messages per second and session (0 disables).
    pub rate_limit_per_second: u32,

    /// Content filter patterns, matched case-insensitively.
    pub content_denylist: Vec<String>,

    /// Bound on handshakes that are accepted but not yet upgraded.
    pub max_pending_handshakes: usize,

    /// Seconds a client may take from request to completed upgrade.
    pub handshake_timeout_secs: u64,

    /// Depth of each session's outbound queue.
    pub session_send_buffer: usize,

    /// WebSocket subprotocols offered to clients.
    pub subprotocols: Vec<String>,

    /// Accepted bearer tokens as `(token, identity)`. Empty permits all.
    pub auth_tokens: Vec<(String, Option<String>)>,

    /// Base URLs of peer gateways. Empty runs standalone.
    pub cluster_peers: Vec<String>,

    /// Shared secret sent and checked on peer traffic.
    pub cluster_secret: Option<String>,

    /// Per-request timeout for peer deliveries in milliseconds.
    pub cluster_timeout_ms: u64,

    /// Emit JSON log lines instead of human-readable text.
    pub log_json: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            node_id: NodeId::random(),
            worker_threads: 0,
            max_frame_size: 64 * 1024,
            max_message_bytes: 64 * 1024,
            rate_limit_per_second: 50,
            content_denylist: Vec::new(),
            max_pending_handshakes: 1024,
            handshake_timeout_secs: 10,
            session_send_buffer: 256,
            subprotocols: Vec::new(),
            auth_tokens: Vec::new(),
            cluster_peers: Vec::new(),
            cluster_secret: None,
            cluster_timeout_ms: 2000,
            log_json: false,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to [`GatewayConfig::default`] values when a variable is
    /// missing or cannot be parsed. Calls `dotenvy::dotenv().ok()` to
    /// optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as a
    /// [`SocketAddr`].
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr: SocketAddr = match std::env::var("LISTEN_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|err| anyhow::anyhow!("invalid LISTEN_ADDR {raw:?}: {err}"))?,
            Err(_) => defaults.listen_addr,
        };

        let node_id = std::env::var("NODE_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map_or(defaults.node_id, |v| NodeId::new(v.trim()));

        let auth_tokens = parse_list("AUTH_TOKENS")
            .into_iter()
            .map(|entry| match entry.split_once(':') {
                Some((token, identity)) => (token.to_string(), Some(identity.to_string())),
                None => (entry, None),
            })
            .collect();

        Ok(Self {
            listen_addr,
            node_id,
            worker_threads: parse_env("WORKER_THREADS", defaults.worker_threads),
            max_frame_size: parse_env("MAX_FRAME_SIZE", defaults.max_frame_size),
            max_message_bytes: parse_env("MAX_MESSAGE_BYTES", defaults.max_message_bytes),
            rate_limit_per_second: parse_env("RATE_LIMIT_PER_SECOND", defaults.rate_limit_per_second),
            content_denylist: parse_list("CONTENT_DENYLIST"),
            max_pending_handshakes: parse_env(
                "MAX_PENDING_HANDSHAKES",
                defaults.max_pending_handshakes,
            ),
            handshake_timeout_secs: parse_env(
                "HANDSHAKE_TIMEOUT_SECS",
                defaults.handshake_timeout_secs,
            ),
            session_send_buffer: parse_env("SESSION_SEND_BUFFER", defaults.session_send_buffer),
            subprotocols: parse_list("SUBPROTOCOLS"),
            auth_tokens,
            cluster_peers: parse_list("CLUSTER_PEERS")
                .into_iter()
                .map(|peer| peer.trim_end_matches('/').to_string())
                .collect(),
            cluster_secret: std::env::var("CLUSTER_SECRET")
                .ok()
                .filter(|v| !v.is_empty()),
            cluster_timeout_ms: parse_env("CLUSTER_TIMEOUT_MS", defaults.cluster_timeout_ms),
            log_json: std::env::var("LOG_FORMAT")
                .is_ok_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses a comma-separated environment variable, dropping blank items.
fn parse_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|raw| split_list(&raw))
        .unwrap_or_default()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_blanks() {
        assert_eq!(
            split_list(" a, b ,,c ,"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn parse_env_falls_back_on_missing_key() {
        assert_eq!(parse_env("RELAY_GATEWAY_TEST_UNSET_KEY", 42u32), 42);
    }

    #[test]
    fn defaults_enable_builtin_filters() {
        let config = GatewayConfig::default();
        assert!(config.max_message_bytes > 0);
        assert!(config.rate_limit_per_second > 0);
        assert!(config.cluster_peers.is_empty());
    }
}
