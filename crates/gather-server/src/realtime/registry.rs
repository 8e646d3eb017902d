//! Live session tracking per principal.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

use gather_core::ids::{PrincipalId, SessionId};

/// Tracks which sessions each principal currently holds.
///
/// A principal may hold many concurrent sessions (multiple tabs); a session
/// id appears under exactly one principal. All mutations take the write
/// lock, so concurrent register/unregister for the same principal cannot
/// corrupt the session set. Process-scoped: constructed once at startup and
/// passed around as an explicit handle.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<PrincipalId, HashSet<SessionId>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a session for `principal` and add it to the principal's
    /// session set. Never fails.
    pub fn register(&self, principal: &PrincipalId) -> SessionId {
        let session = SessionId::new();
        let mut sessions = self.sessions.write();
        let _ = sessions
            .entry(principal.clone())
            .or_default()
            .insert(session.clone());
        debug!(%principal, %session, "session registered");
        session
    }

    /// Remove a session. Returns `true` when this was the principal's last
    /// session (the entry is removed entirely), which drives cascading room
    /// cleanup.
    pub fn unregister(&self, session: &SessionId, principal: &PrincipalId) -> bool {
        let mut sessions = self.sessions.write();
        let Some(set) = sessions.get_mut(principal) else {
            return false;
        };
        let _ = set.remove(session);
        if set.is_empty() {
            let _ = sessions.remove(principal);
            debug!(%principal, %session, "last session closed");
            return true;
        }
        debug!(%principal, %session, remaining = set.len(), "session unregistered");
        false
    }

    /// Whether the principal holds at least one live session.
    pub fn is_connected(&self, principal: &PrincipalId) -> bool {
        self.sessions.read().contains_key(principal)
    }

    /// Sessions currently held by `principal`.
    pub fn sessions_of(&self, principal: &PrincipalId) -> HashSet<SessionId> {
        self.sessions.read().get(principal).cloned().unwrap_or_default()
    }

    /// Total live sessions across all principals.
    pub fn session_count(&self) -> usize {
        self.sessions.read().values().map(HashSet::len).sum()
    }

    /// Number of connected principals.
    pub fn principal_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Empty the registry, returning everything that was live. Used at
    /// process shutdown to drain sessions.
    pub fn drain(&self) -> Vec<(PrincipalId, Vec<SessionId>)> {
        let mut sessions = self.sessions.write();
        sessions
            .drain()
            .map(|(principal, set)| (principal, set.into_iter().collect()))
            .collect()
    }
}
