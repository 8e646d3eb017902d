//! Presence orchestration: connect, join/leave intents, disconnect cleanup.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use gather_core::CoreError;
use gather_core::ids::{PrincipalId, RoomId, SessionId};
use gather_core::wire::ServerFrame;
use gather_store::repository::StoreError;

use super::broadcast::Broadcaster;
use super::registry::ConnectionRegistry;
use super::rooms::RoomDirectory;

/// Orchestrates session lifecycle across the registry, the room directory
/// and the broadcaster.
///
/// Cleanup favors local consistency over distributed consistency: a session
/// that cannot complete its shared-store cleanup is still fully removed
/// from local structures, and the orphaned store record self-heals on the
/// next successful cleanup for that principal.
pub struct PresenceCoordinator {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomDirectory>,
    broadcaster: Arc<Broadcaster>,
}

impl PresenceCoordinator {
    /// Wire the coordinator to its collaborators.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomDirectory>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            registry,
            rooms,
            broadcaster,
        }
    }

    /// Handshake success: allocate a session for the principal.
    pub fn register(&self, principal: &PrincipalId) -> SessionId {
        self.registry.register(principal)
    }

    /// Rejoin every room recorded for the principal in the shared store,
    /// broadcasting `memberJoined` per room. Restores membership after a
    /// reconnect; failures are logged and skipped so one bad record never
    /// blocks the session.
    #[instrument(skip(self), fields(%session, %principal))]
    pub async fn restore_rooms(&self, session: &SessionId, principal: &PrincipalId) {
        let rooms = match self.rooms.rooms_of(principal).await {
            Ok(rooms) => rooms,
            Err(err) => {
                warn!(error = %err, "could not read stored rooms, skipping restore");
                return;
            }
        };
        for room in rooms {
            match self.rooms.join(&room, session, principal).await {
                Ok(count) => {
                    debug!(%room, count, "membership restored");
                    self.broadcaster
                        .to_room(&room, &ServerFrame::member_joined(&room, count))
                        .await;
                }
                Err(err) => warn!(%room, error = %err, "failed to restore room membership"),
            }
        }
    }

    /// Join intent while active. Broadcasts `memberJoined` on success; a
    /// shared-store failure surfaces to the caller (the local join stays
    /// applied and is reconciled by disconnect cleanup).
    pub async fn join_room(
        &self,
        session: &SessionId,
        principal: &PrincipalId,
        room: &RoomId,
    ) -> Result<usize, CoreError> {
        let count = self.rooms.join(room, session, principal).await?;
        self.broadcaster
            .to_room(room, &ServerFrame::member_joined(room, count))
            .await;
        Ok(count)
    }

    /// Leave intent while active. Broadcasts `memberLeft` on success.
    pub async fn leave_room(
        &self,
        session: &SessionId,
        principal: &PrincipalId,
        room: &RoomId,
    ) -> Result<usize, CoreError> {
        let remaining = self.rooms.leave(room, session, principal).await?;
        self.broadcaster
            .to_room(room, &ServerFrame::member_left(room, remaining))
            .await;
        Ok(remaining)
    }

    /// Transport close. Unregisters the session, always purges its local
    /// room membership, and — when this was the principal's last session —
    /// leaves every stored room and clears the principal's shared-store
    /// records, retrying each store call at most once.
    #[instrument(skip(self), fields(%session, %principal))]
    pub async fn disconnect(&self, session: &SessionId, principal: &PrincipalId) {
        let last = self.registry.unregister(session, principal);
        self.broadcaster.remove(session).await;

        if last {
            // Union of local membership and the stored record set, so rooms
            // from a partially completed join are covered either way.
            let mut rooms: HashSet<RoomId> =
                self.rooms.rooms_with_session(session).into_iter().collect();
            match self.rooms_of_with_retry(principal).await {
                Ok(stored) => rooms.extend(stored),
                Err(err) => {
                    warn!(
                        error = %err,
                        "stored room lookup failed, cleaning local membership only"
                    );
                }
            }
            for room in rooms {
                let remaining = self.rooms.drop_local(&room, session);
                if let Err(err) = self.forget_with_retry(principal, &room).await {
                    warn!(%room, error = %err, "shared-store record left orphaned");
                }
                self.broadcaster
                    .to_room(&room, &ServerFrame::member_left(&room, remaining))
                    .await;
            }
            if let Err(err) = self.cleanup_with_retry(principal).await {
                warn!(
                    error = %err,
                    "membership cleanup failed, records self-heal on next cleanup"
                );
            }
        } else {
            // Another session of this principal is still live: the shared
            // store keeps its records, only this session's local membership
            // goes away.
            for (room, remaining) in self.rooms.purge_session(session) {
                self.broadcaster
                    .to_room(&room, &ServerFrame::member_left(&room, remaining))
                    .await;
            }
        }
        info!(last_session = last, "session disconnected");
    }

    /// Process shutdown: drain every live session and flush this node's
    /// shared-store records.
    pub async fn drain(&self) {
        let drained = self.registry.drain();
        info!(principals = drained.len(), "draining sessions for shutdown");
        for (principal, sessions) in drained {
            for session in &sessions {
                let _ = self.rooms.purge_session(session);
                self.broadcaster.remove(session).await;
            }
            if let Err(err) = self.cleanup_with_retry(&principal).await {
                warn!(%principal, error = %err, "shutdown cleanup left orphaned records");
            }
        }
    }

    async fn rooms_of_with_retry(
        &self,
        principal: &PrincipalId,
    ) -> Result<HashSet<RoomId>, StoreError> {
        match self.rooms.rooms_of(principal).await {
            Ok(rooms) => Ok(rooms),
            Err(err) => {
                warn!(error = %err, "stored room lookup failed, retrying once");
                self.rooms.rooms_of(principal).await
            }
        }
    }

    async fn forget_with_retry(
        &self,
        principal: &PrincipalId,
        room: &RoomId,
    ) -> Result<(), StoreError> {
        match self.rooms.forget(principal, room).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(%room, error = %err, "membership record removal failed, retrying once");
                self.rooms.forget(principal, room).await
            }
        }
    }

    async fn cleanup_with_retry(&self, principal: &PrincipalId) -> Result<(), StoreError> {
        match self.rooms.cleanup_principal(principal).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, "membership cleanup failed, retrying once");
                self.rooms.cleanup_principal(principal).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use mockall::mock;
    use tokio::sync::mpsc;

    use gather_store::InMemoryMembershipStore;
    use gather_store::membership::MembershipStore;

    use crate::realtime::connection::ClientConnection;

    mock! {
        Store {}

        #[async_trait::async_trait]
        impl MembershipStore for Store {
            async fn add(&self, principal: &PrincipalId, room: &RoomId) -> Result<(), StoreError>;
            async fn remove(&self, principal: &PrincipalId, room: &RoomId) -> Result<(), StoreError>;
            async fn rooms(&self, principal: &PrincipalId) -> Result<HashSet<RoomId>, StoreError>;
            async fn clear(&self, principal: &PrincipalId) -> Result<(), StoreError>;
        }
    }

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomDirectory>,
        broadcaster: Arc<Broadcaster>,
        presence: PresenceCoordinator,
        store: Arc<InMemoryMembershipStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryMembershipStore::new());
        fixture_with_store(store.clone(), Some(store))
    }

    fn fixture_with_mock(store: MockStore) -> Fixture {
        fixture_with_store(Arc::new(store), None)
    }

    fn fixture_with_store(
        store: Arc<dyn MembershipStore>,
        in_memory: Option<Arc<InMemoryMembershipStore>>,
    ) -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomDirectory::new(store));
        let broadcaster = Arc::new(Broadcaster::new(rooms.clone()));
        let presence =
            PresenceCoordinator::new(registry.clone(), rooms.clone(), broadcaster.clone());
        Fixture {
            registry,
            rooms,
            broadcaster,
            presence,
            store: in_memory.unwrap_or_else(|| Arc::new(InMemoryMembershipStore::new())),
        }
    }

    fn alice() -> PrincipalId {
        PrincipalId::from("alice")
    }

    fn room(id: &str) -> RoomId {
        RoomId::from(id)
    }

    async fn attach(
        fx: &Fixture,
        session: &SessionId,
        principal: &PrincipalId,
    ) -> mpsc::Receiver<Arc<String>> {
        let (tx, rx) = mpsc::channel(32);
        let conn = Arc::new(ClientConnection::new(
            session.clone(),
            principal.clone(),
            tx,
        ));
        fx.broadcaster.add(conn).await;
        rx
    }

    fn frame(raw: &Arc<String>) -> serde_json::Value {
        serde_json::from_str(raw).unwrap()
    }

    #[tokio::test]
    async fn join_broadcasts_member_joined_with_count() {
        let fx = fixture();
        let session = fx.presence.register(&alice());
        let mut rx = attach(&fx, &session, &alice()).await;

        let count = fx
            .presence
            .join_room(&session, &alice(), &room("event:1"))
            .await
            .unwrap();
        assert_eq!(count, 1);

        let msg = frame(&rx.recv().await.unwrap());
        assert_eq!(msg["type"], "memberJoined");
        assert_eq!(msg["data"]["roomId"], "event:1");
        assert_eq!(msg["data"]["activeCount"], 1);
    }

    #[tokio::test]
    async fn leave_broadcasts_member_left_with_remaining() {
        let fx = fixture();
        let s1 = fx.presence.register(&alice());
        let s2 = fx.presence.register(&alice());
        let _rx1 = attach(&fx, &s1, &alice()).await;
        let mut rx2 = attach(&fx, &s2, &alice()).await;
        let _ = fx.presence.join_room(&s1, &alice(), &room("event:1")).await.unwrap();
        let _ = fx.presence.join_room(&s2, &alice(), &room("event:1")).await.unwrap();
        // Drain the join frames.
        while rx2.try_recv().is_ok() {}

        let remaining = fx
            .presence
            .leave_room(&s1, &alice(), &room("event:1"))
            .await
            .unwrap();
        assert_eq!(remaining, 1);

        let msg = frame(&rx2.recv().await.unwrap());
        assert_eq!(msg["type"], "memberLeft");
        assert_eq!(msg["data"]["activeCount"], 1);
    }

    #[tokio::test]
    async fn restore_rooms_rejoins_stored_membership() {
        let fx = fixture();
        fx.store.add(&alice(), &room("event:1")).await.unwrap();
        fx.store.add(&alice(), &room("event:2")).await.unwrap();

        let session = fx.presence.register(&alice());
        let mut rx = attach(&fx, &session, &alice()).await;
        fx.presence.restore_rooms(&session, &alice()).await;

        assert_eq!(fx.rooms.local_count(&room("event:1")), 1);
        assert_eq!(fx.rooms.local_count(&room("event:2")), 1);
        // One memberJoined per restored room.
        let mut joined = 0;
        while let Ok(raw) = rx.try_recv() {
            if frame(&raw)["type"] == "memberJoined" {
                joined += 1;
            }
        }
        assert_eq!(joined, 2);
    }

    #[tokio::test]
    async fn disconnect_last_session_cleans_everything() {
        let fx = fixture();
        let session = fx.presence.register(&alice());
        let _rx = attach(&fx, &session, &alice()).await;
        let _ = fx.presence.join_room(&session, &alice(), &room("event:1")).await.unwrap();
        let _ = fx.presence.join_room(&session, &alice(), &room("event:2")).await.unwrap();

        // Bob watches event:1 from another principal.
        let bob = PrincipalId::from("bob");
        let bob_session = fx.presence.register(&bob);
        let mut bob_rx = attach(&fx, &bob_session, &bob).await;
        let _ = fx.presence.join_room(&bob_session, &bob, &room("event:1")).await.unwrap();
        while bob_rx.try_recv().is_ok() {}

        fx.presence.disconnect(&session, &alice()).await;

        assert!(!fx.registry.is_connected(&alice()));
        assert_eq!(fx.rooms.local_count(&room("event:1")), 1);
        assert_eq!(fx.rooms.local_count(&room("event:2")), 0);
        assert!(fx.store.rooms(&alice()).await.unwrap().is_empty());

        let msg = frame(&bob_rx.recv().await.unwrap());
        assert_eq!(msg["type"], "memberLeft");
        assert_eq!(msg["data"]["roomId"], "event:1");
        assert_eq!(msg["data"]["activeCount"], 1);
    }

    #[tokio::test]
    async fn disconnect_one_of_two_sessions_keeps_membership() {
        let fx = fixture();
        let s1 = fx.presence.register(&alice());
        let s2 = fx.presence.register(&alice());
        let _rx1 = attach(&fx, &s1, &alice()).await;
        let _rx2 = attach(&fx, &s2, &alice()).await;
        let _ = fx.presence.join_room(&s1, &alice(), &room("event:1")).await.unwrap();
        let _ = fx.presence.join_room(&s2, &alice(), &room("event:1")).await.unwrap();

        fx.presence.disconnect(&s1, &alice()).await;

        // The principal remains connected and a member of all rooms: the
        // surviving session's membership and the stored record are intact.
        assert!(fx.registry.is_connected(&alice()));
        assert_eq!(fx.rooms.local_count(&room("event:1")), 1);
        assert!(
            fx.store
                .rooms(&alice())
                .await
                .unwrap()
                .contains(&room("event:1"))
        );
    }

    #[tokio::test]
    async fn disconnect_after_partial_join_is_safe() {
        let fx = fixture();
        let session = fx.presence.register(&alice());
        // Local membership applied without any stored record, as after a
        // join whose shared-store write never landed.
        let count = fx.rooms.join(&room("event:1"), &session, &alice()).await.unwrap();
        assert_eq!(count, 1);
        fx.store.clear(&alice()).await.unwrap();

        fx.presence.disconnect(&session, &alice()).await;
        assert_eq!(fx.rooms.local_count(&room("event:1")), 0);
        assert!(fx.store.rooms(&alice()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cleanup_retries_clear_once_on_failure() {
        let mut store = MockStore::new();
        let _ = store.expect_rooms().returning(|_| Ok(HashSet::new()));
        let mut calls = 0;
        let _ = store.expect_clear().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(StoreError::unavailable("connection reset"))
            } else {
                Ok(())
            }
        });

        let fx = fixture_with_mock(store);
        let session = fx.presence.register(&alice());
        fx.presence.disconnect(&session, &alice()).await;
        // MockStore::expect_clear verifies exactly two calls on drop.
    }

    #[tokio::test]
    async fn local_cleanup_completes_when_store_keeps_failing() {
        let mut store = MockStore::new();
        let _ = store
            .expect_add()
            .returning(|_, _| Err(StoreError::unavailable("down")));
        let _ = store
            .expect_rooms()
            .returning(|_| Err(StoreError::unavailable("down")));
        let _ = store
            .expect_remove()
            .returning(|_, _| Err(StoreError::unavailable("down")));
        let _ = store
            .expect_clear()
            .returning(|_| Err(StoreError::unavailable("down")));

        let fx = fixture_with_mock(store);
        let session = fx.presence.register(&alice());
        // Join surfaces the store failure but applies locally.
        let err = fx
            .presence
            .join_room(&session, &alice(), &room("event:1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::TransientStore { .. }));
        assert_eq!(fx.rooms.local_count(&room("event:1")), 1);

        fx.presence.disconnect(&session, &alice()).await;
        // Local structures are fully cleaned despite every store call failing.
        assert_eq!(fx.rooms.local_count(&room("event:1")), 0);
        assert!(!fx.registry.is_connected(&alice()));
    }

    #[tokio::test]
    async fn drain_flushes_all_principals() {
        let fx = fixture();
        let s1 = fx.presence.register(&alice());
        let bob = PrincipalId::from("bob");
        let s2 = fx.presence.register(&bob);
        let _ = fx.presence.join_room(&s1, &alice(), &room("event:1")).await.unwrap();
        let _ = fx.presence.join_room(&s2, &bob, &room("event:2")).await.unwrap();

        fx.presence.drain().await;

        assert_eq!(fx.registry.session_count(), 0);
        assert_eq!(fx.rooms.room_count(), 0);
        assert!(fx.store.rooms(&alice()).await.unwrap().is_empty());
        assert!(fx.store.rooms(&bob).await.unwrap().is_empty());
    }
}
