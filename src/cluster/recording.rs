//! Test transport that keeps published envelopes in memory.

use std::sync::Mutex;

use super::{ClusterEnvelope, ClusterTransport};

/// Records every envelope instead of sending it.
#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<ClusterEnvelope>>,
}

impl RecordingTransport {
    /// Drains and returns the recorded envelopes.
    pub(crate) fn take(&self) -> Vec<ClusterEnvelope> {
        self.sent
            .lock()
            .map(|mut sent| std::mem::take(&mut *sent))
            .unwrap_or_default()
    }
}

impl ClusterTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn publish(&self, envelope: ClusterEnvelope) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(envelope);
        }
    }
}
