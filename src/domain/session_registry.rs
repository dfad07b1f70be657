//! Concurrent session index keyed by session id and by endpoint path.
//!
//! [`SessionRegistry`] uses sharded concurrent maps ([`DashMap`]) so that
//! connects, disconnects, and broadcasts on different sessions never
//! contend on a single global lock. Iteration for broadcast works on a
//! snapshot of the path's members: sessions added while a broadcast is in
//! flight may or may not see that message, but the index itself is never
//! left inconsistent.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use super::{Payload, Session, SessionId};
use crate::error::GatewayError;

/// Index of all sessions connected to this node.
///
/// # Concurrency
///
/// - `sessions` and `by_path` are independent sharded maps.
/// - No operation holds a lock on one map while acquiring a lock on the
///   other, so there is no lock ordering to violate.
/// - An empty path bucket is only removed under its shard lock
///   (`remove_if`), so a concurrent `add` to the same path cannot lose its
///   entry.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    by_path: DashMap<String, DashSet<SessionId>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under its id and its path.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DuplicateSession`] if a session with the same
    /// id is already registered (should never happen with UUID v4).
    pub fn add(&self, session: Arc<Session>) -> Result<(), GatewayError> {
        let id = session.id();
        let path = session.path().to_string();
        match self.sessions.entry(id) {
            Entry::Occupied(_) => return Err(GatewayError::DuplicateSession(id)),
            Entry::Vacant(slot) => {
                slot.insert(session);
            }
        }
        self.by_path.entry(path).or_default().insert(id);
        Ok(())
    }

    /// Removes a session, returning it if it was registered.
    ///
    /// Removing an unknown id is a no-op and returns `None`. Exactly one of
    /// any number of concurrent callers observes `Some` for a given id.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(id)?;
        if let Some(members) = self.by_path.get(session.path()) {
            members.remove(id);
        }
        self.by_path
            .remove_if(session.path(), |_, members| members.is_empty());
        Some(session)
    }

    /// Returns the session with the given id.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns a snapshot of the sessions bound to `path`.
    #[must_use]
    pub fn sessions_for(&self, path: &str) -> Vec<Arc<Session>> {
        let ids: Vec<SessionId> = match self.by_path.get(path) {
            Some(members) => members.iter().map(|id| *id).collect(),
            None => return Vec::new(),
        };
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Returns the number of sessions bound to `path`.
    #[must_use]
    pub fn count_for(&self, path: &str) -> usize {
        self.by_path.get(path).map_or(0, |members| members.len())
    }

    /// Returns every path with at least one session, with its count.
    #[must_use]
    pub fn path_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = self
            .by_path
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().len()))
            .filter(|(_, count)| *count > 0)
            .collect();
        counts.sort();
        counts
    }

    /// Returns a snapshot of every registered session.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Sends `payload` to every session on `path` accepted by `predicate`.
    ///
    /// `on_sent` runs once per session that accepted the frame. Returns the
    /// number of such sessions.
    pub fn deliver<P, F>(&self, path: &str, payload: &Payload, predicate: P, mut on_sent: F) -> usize
    where
        P: Fn(&Session) -> bool,
        F: FnMut(&Session),
    {
        let mut delivered = 0usize;
        for session in self.sessions_for(path) {
            if !predicate(&session) {
                continue;
            }
            if session.send(payload.clone()) {
                on_sent(&session);
                delivered = delivered.saturating_add(1);
            }
        }
        delivered
    }

    /// Returns the total number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
