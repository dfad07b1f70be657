//! Message size limit. Runs first: it is the cheapest check.

use super::MessageFilter;
use crate::domain::{Payload, Session};

/// Rejects payloads longer than a fixed number of bytes.
#[derive(Debug, Clone, Copy)]
pub struct SizeLimitFilter {
    max_bytes: usize,
}

impl SizeLimitFilter {
    /// Creates a filter accepting payloads of at most `max_bytes`.
    #[must_use]
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl MessageFilter for SizeLimitFilter {
    fn name(&self) -> &'static str {
        "size"
    }

    fn order(&self) -> i32 {
        0
    }

    fn evaluate(&self, _session: &Session, payload: &Payload) -> bool {
        payload.len() <= self.max_bytes
    }
}
