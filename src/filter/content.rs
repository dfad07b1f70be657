//! Content denylist.
//!
//! Patterns are compiled once into a case-insensitive [`RegexSet`]; a text
//! payload matching any of them is dropped. Binary payloads are opaque to
//! the gateway and always pass.

use regex::{RegexSet, RegexSetBuilder};

use super::MessageFilter;
use crate::domain::{Payload, Session};
use crate::error::GatewayError;

/// Rejects text payloads matching any denylisted pattern.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    denylist: RegexSet,
}

impl ContentFilter {
    /// Compiles the denylist.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidConfig`] if a pattern fails to
    /// compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, GatewayError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let denylist = RegexSetBuilder::new(patterns)
            .case_insensitive(true)
            .build()
            .map_err(|err| GatewayError::InvalidConfig(format!("content denylist: {err}")))?;
        Ok(Self { denylist })
    }
}

impl MessageFilter for ContentFilter {
    fn name(&self) -> &'static str {
        "content"
    }

    fn order(&self) -> i32 {
        2
    }

    fn evaluate(&self, _session: &Session, payload: &Payload) -> bool {
        match payload.as_text() {
            Some(text) => !self.denylist.is_match(text),
            None => true,
        }
    }
}
