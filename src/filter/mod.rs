//! Inbound filter pipeline.
//!
//! Every inbound payload passes through an ordered chain of
//! [`MessageFilter`]s before it reaches an endpoint callback. Filters run
//! strictly in ascending [`MessageFilter::order`]; the first one that
//! rejects short-circuits the chain and the payload is dropped silently.
//! The connection stays open and the client is not told why.

pub mod content;
pub mod rate;
pub mod size;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use content::ContentFilter;
pub use rate::RateLimitFilter;
pub use size::SizeLimitFilter;

use crate::config::GatewayConfig;
use crate::domain::{Payload, Session, SessionId};
use crate::error::GatewayError;

/// A single inbound gate.
pub trait MessageFilter: Send + Sync + fmt::Debug {
    /// Short name used in logs and traces.
    fn name(&self) -> &'static str;

    /// Position in the chain; lower runs first.
    fn order(&self) -> i32;

    /// Returns `true` to let the payload through.
    fn evaluate(&self, session: &Session, payload: &Payload) -> bool;

    /// Drops any per-session state once the session is gone.
    fn session_closed(&self, _session_id: &SessionId) {}
}

/// Outcome of running the pipeline on one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// Every filter accepted the payload.
    Pass,
    /// The named filter rejected the payload.
    Reject {
        /// Name of the rejecting filter.
        filter: &'static str,
    },
}

impl FilterVerdict {
    /// Returns `true` for [`FilterVerdict::Pass`].
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Ordered, short-circuiting chain of filters.
#[derive(Debug, Default)]
pub struct FilterPipeline {
    filters: Vec<Arc<dyn MessageFilter>>,
}

impl FilterPipeline {
    /// Builds a pipeline, sorting filters by ascending order. Filters with
    /// equal order keep the order in which they were given.
    #[must_use]
    pub fn new(mut filters: Vec<Arc<dyn MessageFilter>>) -> Self {
        filters.sort_by_key(|filter| filter.order());
        Self { filters }
    }

    /// Builds the built-in chain (size, then rate, then content) from the
    /// gateway configuration. A zero limit or an empty denylist leaves the
    /// corresponding filter out.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidConfig`] if a denylist pattern is not
    /// a valid regular expression.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let mut filters: Vec<Arc<dyn MessageFilter>> = Vec::new();
        if config.max_message_bytes > 0 {
            filters.push(Arc::new(SizeLimitFilter::new(config.max_message_bytes)));
        }
        if config.rate_limit_per_second > 0 {
            filters.push(Arc::new(RateLimitFilter::new(
                config.rate_limit_per_second,
                Duration::from_secs(1),
            )));
        }
        if !config.content_denylist.is_empty() {
            filters.push(Arc::new(ContentFilter::new(&config.content_denylist)?));
        }
        Ok(Self::new(filters))
    }

    /// Runs the chain on one payload.
    pub fn evaluate(&self, session: &Session, payload: &Payload) -> FilterVerdict {
        for filter in &self.filters {
            if !filter.evaluate(session, payload) {
                return FilterVerdict::Reject {
                    filter: filter.name(),
                };
            }
        }
        FilterVerdict::Pass
    }

    /// Notifies every filter that a session is gone.
    pub fn session_closed(&self, session_id: &SessionId) {
        for filter in &self.filters {
            filter.session_closed(session_id);
        }
    }

    /// Returns filter names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|filter| filter.name()).collect()
    }

    /// Returns the number of filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if the pipeline lets everything through.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
