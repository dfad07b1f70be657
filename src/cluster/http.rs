//! HTTP peer transport.
//!
//! Posts each envelope as JSON to `POST {peer}/internal/cluster` on every
//! configured peer. Each peer has one delivery task draining a bounded
//! queue, so a peer receives envelopes in publish order and a
//! `session_removed` never overtakes the `session_added` it follows. A
//! failed delivery is logged and forgotten; a full queue drops the
//! envelope.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::mpsc;

use super::{CLUSTER_SECRET_HEADER, ClusterEnvelope, ClusterTransport};
use crate::error::GatewayError;

/// Path peers accept envelopes on.
pub const CLUSTER_INBOUND_PATH: &str = "/internal/cluster";

/// Envelopes buffered per peer before new ones are dropped.
pub const PEER_QUEUE_DEPTH: usize = 1024;

type PeerQueue = mpsc::Sender<Arc<ClusterEnvelope>>;

/// [`ClusterTransport`] over plain HTTP between gateway nodes.
#[derive(Debug, Clone)]
pub struct HttpPeerTransport {
    client: reqwest::Client,
    peers: Arc<[String]>,
    secret: Option<Arc<str>>,
    queues: Arc<OnceLock<Vec<PeerQueue>>>,
}

impl HttpPeerTransport {
    /// Creates a transport for the given peer base URLs.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidConfig`] if the HTTP client cannot be
    /// built.
    pub fn new(
        peers: Vec<String>,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::InvalidConfig(format!("cluster http client: {err}")))?;
        Ok(Self {
            client,
            peers: peers.into(),
            secret: secret.map(Into::into),
            queues: Arc::new(OnceLock::new()),
        })
    }

    /// Returns the configured peer base URLs.
    #[must_use]
    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Starts one delivery task per peer on `handle`.
    fn start_workers(&self, handle: &tokio::runtime::Handle) -> Vec<PeerQueue> {
        self.peers
            .iter()
            .map(|peer| {
                let (tx, rx) = mpsc::channel(PEER_QUEUE_DEPTH);
                handle.spawn(deliver(
                    self.client.clone(),
                    peer.clone(),
                    self.secret.clone(),
                    rx,
                ));
                tx
            })
            .collect()
    }
}

/// Posts queued envelopes to one peer, one request at a time.
async fn deliver(
    client: reqwest::Client,
    peer: String,
    secret: Option<Arc<str>>,
    mut queue: mpsc::Receiver<Arc<ClusterEnvelope>>,
) {
    let url = format!("{peer}{CLUSTER_INBOUND_PATH}");
    while let Some(envelope) = queue.recv().await {
        let kind = envelope.message.kind();
        let mut request = client.post(&url).json(envelope.as_ref());
        if let Some(secret) = &secret {
            request = request.header(CLUSTER_SECRET_HEADER, secret.as_ref());
        }
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::trace!(peer = %peer, kind, "cluster envelope delivered");
            }
            Ok(response) => {
                tracing::warn!(
                    peer = %peer,
                    kind,
                    status = %response.status(),
                    "peer refused cluster envelope"
                );
            }
            Err(err) => {
                tracing::warn!(peer = %peer, kind, error = %err, "cluster delivery failed");
            }
        }
    }
    tracing::debug!(peer = %peer, "cluster delivery task stopped");
}

impl ClusterTransport for HttpPeerTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn publish(&self, envelope: ClusterEnvelope) {
        let queues = match self.queues.get() {
            Some(queues) => queues,
            None => {
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    tracing::warn!(
                        kind = envelope.message.kind(),
                        "no runtime, cluster envelope dropped"
                    );
                    return;
                };
                self.queues.get_or_init(|| self.start_workers(&handle))
            }
        };
        let envelope = Arc::new(envelope);
        for (peer, queue) in self.peers.iter().zip(queues) {
            match queue.try_send(Arc::clone(&envelope)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        peer = %peer,
                        kind = envelope.message.kind(),
                        "peer queue full, cluster envelope dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!(
                        peer = %peer,
                        kind = envelope.message.kind(),
                        "peer delivery task gone, cluster envelope dropped"
                    );
                }
            }
        }
    }
}
