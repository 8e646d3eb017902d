//! The shared cross-process room-membership store seam.
//!
//! Keyed by principal, set-valued: `rooms(principal)` answers "what rooms
//! does this principal belong to" so disconnect cleanup and reconnects can
//! reconstruct membership without a cross-node scan. Set add/remove are
//! commutative, so concurrent joins and leaves of different sessions need
//! no distributed lock.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use gather_core::ids::{PrincipalId, RoomId};

use crate::repository::StoreError;

/// Shared key-set store for room membership records.
///
/// Any call may fail transiently (the store lives across a network in
/// production deployments); callers decide the retry policy.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Record that `principal` belongs to `room`. Idempotent.
    async fn add(&self, principal: &PrincipalId, room: &RoomId) -> Result<(), StoreError>;

    /// Remove one room record. Removing an absent record is a no-op.
    async fn remove(&self, principal: &PrincipalId, room: &RoomId) -> Result<(), StoreError>;

    /// All rooms recorded for `principal`.
    async fn rooms(&self, principal: &PrincipalId) -> Result<HashSet<RoomId>, StoreError>;

    /// Remove every room record for `principal`. Idempotent.
    async fn clear(&self, principal: &PrincipalId) -> Result<(), StoreError>;
}

/// In-memory [`MembershipStore`] for single-node deployments and tests.
#[derive(Default)]
pub struct InMemoryMembershipStore {
    rooms: RwLock<HashMap<PrincipalId, HashSet<RoomId>>>,
}

impl InMemoryMembershipStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of principals with at least one record (test/introspection).
    pub async fn principal_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[async_trait]
impl MembershipStore for InMemoryMembershipStore {
    async fn add(&self, principal: &PrincipalId, room: &RoomId) -> Result<(), StoreError> {
        let mut rooms = self.rooms.write().await;
        let _ = rooms.entry(principal.clone()).or_default().insert(room.clone());
        Ok(())
    }

    async fn remove(&self, principal: &PrincipalId, room: &RoomId) -> Result<(), StoreError> {
        let mut rooms = self.rooms.write().await;
        if let Some(set) = rooms.get_mut(principal) {
            let _ = set.remove(room);
            if set.is_empty() {
                let _ = rooms.remove(principal);
            }
        }
        Ok(())
    }

    async fn rooms(&self, principal: &PrincipalId) -> Result<HashSet<RoomId>, StoreError> {
        Ok(self.rooms.read().await.get(principal).cloned().unwrap_or_default())
    }

    async fn clear(&self, principal: &PrincipalId) -> Result<(), StoreError> {
        let _ = self.rooms.write().await.remove(principal);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str) -> PrincipalId {
        PrincipalId::from(id)
    }

    fn r(id: &str) -> RoomId {
        RoomId::from(id)
    }

    #[tokio::test]
    async fn add_and_list() {
        let store = InMemoryMembershipStore::new();
        store.add(&p("alice"), &r("event:1")).await.unwrap();
        store.add(&p("alice"), &r("event:2")).await.unwrap();

        let rooms = store.rooms(&p("alice")).await.unwrap();
        assert_eq!(rooms.len(), 2);
        assert!(rooms.contains(&r("event:1")));
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let store = InMemoryMembershipStore::new();
        store.add(&p("alice"), &r("event:1")).await.unwrap();
        store.add(&p("alice"), &r("event:1")).await.unwrap();
        assert_eq!(store.rooms(&p("alice")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_drops_empty_principal_entry() {
        let store = InMemoryMembershipStore::new();
        store.add(&p("alice"), &r("event:1")).await.unwrap();
        store.remove(&p("alice"), &r("event:1")).await.unwrap();

        assert!(store.rooms(&p("alice")).await.unwrap().is_empty());
        assert_eq!(store.principal_count().await, 0);
    }

    #[tokio::test]
    async fn remove_absent_record_is_noop() {
        let store = InMemoryMembershipStore::new();
        store.remove(&p("alice"), &r("event:1")).await.unwrap();
        assert!(store.rooms(&p("alice")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let store = InMemoryMembershipStore::new();
        store.add(&p("alice"), &r("event:1")).await.unwrap();
        store.add(&p("alice"), &r("event:2")).await.unwrap();

        store.clear(&p("alice")).await.unwrap();
        store.clear(&p("alice")).await.unwrap();
        assert!(store.rooms(&p("alice")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn principals_are_isolated() {
        let store = InMemoryMembershipStore::new();
        store.add(&p("alice"), &r("event:1")).await.unwrap();
        store.add(&p("bob"), &r("event:2")).await.unwrap();

        store.clear(&p("alice")).await.unwrap();
        let bob_rooms = store.rooms(&p("bob")).await.unwrap();
        assert_eq!(bob_rooms.len(), 1);
    }
}
