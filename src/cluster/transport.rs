//! Channels that carry [`ClusterEnvelope`]s between nodes.
//!
//! Every transport is fire-and-forget: `publish` never blocks, never
//! retries and reports nothing back to the caller.

use std::fmt;

use tokio::sync::broadcast;

use super::ClusterEnvelope;

/// Outbound side of a cluster channel.
pub trait ClusterTransport: Send + Sync + fmt::Debug {
    /// Short name used in logs and `/stats`.
    fn name(&self) -> &'static str;

    /// Hands `envelope` to every peer, best effort.
    fn publish(&self, envelope: ClusterEnvelope);
}

/// Transport for a node without peers. Publishes are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandaloneTransport;

impl ClusterTransport for StandaloneTransport {
    fn name(&self) -> &'static str {
        "standalone"
    }

    fn publish(&self, envelope: ClusterEnvelope) {
        tracing::trace!(kind = envelope.message.kind(), "standalone node, envelope dropped");
    }
}

/// In-process bus connecting several gateway nodes.
///
/// Backed by a `tokio::broadcast` channel: every node publishes through a
/// [`HubTransport`] and consumes through its own receiver, so each node
/// also sees its own envelopes and must skip them. When the ring buffer is
/// full, the oldest envelopes are dropped for lagging receivers.
#[derive(Debug, Clone)]
pub struct ClusterHub {
    sender: broadcast::Sender<ClusterEnvelope>,
}

impl ClusterHub {
    /// Creates a hub with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns a transport that publishes onto this hub.
    #[must_use]
    pub fn transport(&self) -> HubTransport {
        HubTransport {
            sender: self.sender.clone(),
        }
    }

    /// Creates a receiver for all future envelopes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEnvelope> {
        self.sender.subscribe()
    }

    /// Returns the number of attached receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// [`ClusterTransport`] publishing onto a [`ClusterHub`].
#[derive(Debug, Clone)]
pub struct HubTransport {
    sender: broadcast::Sender<ClusterEnvelope>,
}

impl ClusterTransport for HubTransport {
    fn name(&self) -> &'static str {
        "hub"
    }

    fn publish(&self, envelope: ClusterEnvelope) {
        // No receivers simply means no peers are attached yet.
        let _ = self.sender.send(envelope);
    }
}
