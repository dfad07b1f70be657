//! Per-session message rate limit.
//!
//! Fixed-window counter: each session may send `budget` messages per
//! `window`. State lives in a sharded map keyed by session id and is
//! dropped when the session closes, so it never outgrows the set of live
//! sessions.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::MessageFilter;
use crate::domain::{Payload, Session, SessionId};

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Rejects payloads once a session exceeds its per-window budget.
#[derive(Debug)]
pub struct RateLimitFilter {
    budget: u32,
    window: Duration,
    windows: DashMap<SessionId, Window>,
}

impl RateLimitFilter {
    /// Creates a filter allowing `budget` messages per `window` and
    /// session.
    #[must_use]
    pub fn new(budget: u32, window: Duration) -> Self {
        Self {
            budget,
            window,
            windows: DashMap::new(),
        }
    }

    /// Counts a message for `session_id` at `now` and returns whether it
    /// fits the budget.
    fn admit(&self, session_id: SessionId, now: Instant) -> bool {
        let mut entry = self.windows.entry(session_id).or_insert(Window {
            started: now,
            count: 0,
        });
        let window = entry.value_mut();
        if now.saturating_duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }
        if window.count >= self.budget {
            return false;
        }
        window.count = window.count.saturating_add(1);
        true
    }

    /// Returns the number of sessions with live rate state.
    #[must_use]
    pub fn tracked_sessions(&self) -> usize {
        self.windows.len()
    }
}

impl MessageFilter for RateLimitFilter {
    fn name(&self) -> &'static str {
        "rate"
    }

    fn order(&self) -> i32 {
        1
    }

    fn evaluate(&self, session: &Session, _payload: &Payload) -> bool {
        self.admit(session.id(), Instant::now())
    }

    fn session_closed(&self, session_id: &SessionId) {
        self.windows.remove(session_id);
    }
}
