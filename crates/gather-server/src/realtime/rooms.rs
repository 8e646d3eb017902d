//! Room membership tracking.
//!
//! Local membership (per process) answers "who is in this room on this
//! node" for broadcast fan-out. The shared [`MembershipStore`] answers
//! "what rooms does this principal belong to", which reconnects and
//! cross-node cleanup need. The two are eventually consistent: local
//! membership is authoritative for fan-out, the shared store for cleanup
//! bookkeeping.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use gather_core::ids::{PrincipalId, RoomId, SessionId};
use gather_store::membership::MembershipStore;
use gather_store::repository::StoreError;

/// Per-room member sets plus the shared-store mirror.
pub struct RoomDirectory {
    local: RwLock<HashMap<RoomId, HashSet<SessionId>>>,
    store: Arc<dyn MembershipStore>,
}

impl RoomDirectory {
    /// Create a directory backed by `store`.
    pub fn new(store: Arc<dyn MembershipStore>) -> Self {
        Self {
            local: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Add a session to a room and record the membership under the
    /// principal in the shared store. Returns the room's local member
    /// count.
    ///
    /// Local membership is applied before the shared-store write, so a
    /// store failure surfaces without undoing the local join.
    pub async fn join(
        &self,
        room: &RoomId,
        session: &SessionId,
        principal: &PrincipalId,
    ) -> Result<usize, StoreError> {
        let count = {
            let mut local = self.local.write();
            let members = local.entry(room.clone()).or_default();
            let _ = members.insert(session.clone());
            members.len()
        };
        debug!(%room, %session, count, "session joined room");
        self.store.add(principal, room).await?;
        Ok(count)
    }

    /// Remove a session from a room and drop the shared-store record.
    /// Returns the remaining local count (0 means the room is now empty on
    /// this node and has been dropped).
    pub async fn leave(
        &self,
        room: &RoomId,
        session: &SessionId,
        principal: &PrincipalId,
    ) -> Result<usize, StoreError> {
        let remaining = self.drop_local(room, session);
        debug!(%room, %session, remaining, "session left room");
        self.store.remove(principal, room).await?;
        Ok(remaining)
    }

    /// Remove a session from a room locally only. Returns the remaining
    /// count. Safe to call for rooms the session never joined.
    pub fn drop_local(&self, room: &RoomId, session: &SessionId) -> usize {
        let mut local = self.local.write();
        let Some(members) = local.get_mut(room) else {
            return 0;
        };
        let _ = members.remove(session);
        let remaining = members.len();
        if remaining == 0 {
            let _ = local.remove(room);
        }
        remaining
    }

    /// Shared-store record removal only. Used by the disconnect cleanup
    /// retry path after the local side has already been purged.
    pub async fn forget(
        &self,
        principal: &PrincipalId,
        room: &RoomId,
    ) -> Result<(), StoreError> {
        self.store.remove(principal, room).await
    }

    /// Rooms recorded for `principal` in the shared store. May involve
    /// network I/O; failures surface without touching local state.
    pub async fn rooms_of(
        &self,
        principal: &PrincipalId,
    ) -> Result<HashSet<RoomId>, StoreError> {
        self.store.rooms(principal).await
    }

    /// Remove every shared-store membership record for `principal`.
    /// Idempotent: clearing an already-clean principal is a no-op.
    pub async fn cleanup_principal(&self, principal: &PrincipalId) -> Result<(), StoreError> {
        self.store.clear(principal).await
    }

    /// Current local members of a room (broadcast fan-out set).
    pub fn local_members(&self, room: &RoomId) -> Vec<SessionId> {
        self.local
            .read()
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Current local member count of a room.
    pub fn local_count(&self, room: &RoomId) -> usize {
        self.local.read().get(room).map_or(0, HashSet::len)
    }

    /// Rooms that currently contain `session` locally.
    pub fn rooms_with_session(&self, session: &SessionId) -> Vec<RoomId> {
        self.local
            .read()
            .iter()
            .filter(|(_, members)| members.contains(session))
            .map(|(room, _)| room.clone())
            .collect()
    }

    /// Remove `session` from every local room. Returns each affected room
    /// with its remaining count. Idempotent, and safe to run concurrently
    /// with (or right after) a partially completed join.
    pub fn purge_session(&self, session: &SessionId) -> Vec<(RoomId, usize)> {
        let mut local = self.local.write();
        let mut affected = Vec::new();
        local.retain(|room, members| {
            if members.remove(session) {
                affected.push((room.clone(), members.len()));
            }
            !members.is_empty()
        });
        affected
    }

    /// Number of rooms with at least one local member.
    pub fn room_count(&self) -> usize {
        self.local.read().len()
    }
}
