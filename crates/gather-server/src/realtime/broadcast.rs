//! Frame fan-out to connected sessions.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use gather_core::ids::{RoomId, SessionId};
use gather_core::wire::ServerFrame;

use super::connection::ClientConnection;
use super::rooms::RoomDirectory;

/// Delivers frames to sessions: per room, globally, or to one session.
///
/// Delivery is best-effort and fire-and-forget — no acknowledgment, no
/// retry. Within a single room, frames reach current members in the order
/// they were issued; across rooms there is no ordering guarantee.
pub struct Broadcaster {
    connections: RwLock<HashMap<SessionId, Arc<ClientConnection>>>,
    rooms: Arc<RoomDirectory>,
}

impl Broadcaster {
    /// Create a broadcaster that resolves room fan-out sets from `rooms`.
    pub fn new(rooms: Arc<RoomDirectory>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            rooms,
        }
    }

    /// Register a connection for delivery.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        let _ = conns.insert(connection.id.clone(), connection);
    }

    /// Remove a connection.
    pub async fn remove(&self, session: &SessionId) {
        let mut conns = self.connections.write().await;
        let _ = conns.remove(session);
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Deliver a frame to every session in the room's local membership.
    pub async fn to_room(&self, room: &RoomId, frame: &ServerFrame) {
        let Some(json) = serialize(frame) else { return };
        let members = self.rooms.local_members(room);
        let conns = self.connections.read().await;
        debug!(
            frame_type = frame.frame_type,
            %room,
            recipients = members.len(),
            "broadcast frame to room"
        );
        for session in &members {
            if let Some(conn) = conns.get(session) {
                if !conn.send(Arc::clone(&json)) {
                    counter!("ws_broadcast_drops_total").increment(1);
                    warn!(%session, %room, "failed to deliver frame to session");
                }
            }
        }
    }

    /// Deliver a frame to every registered session.
    pub async fn to_all(&self, frame: &ServerFrame) {
        let Some(json) = serialize(frame) else { return };
        let conns = self.connections.read().await;
        debug!(
            frame_type = frame.frame_type,
            recipients = conns.len(),
            "broadcast frame to all"
        );
        for conn in conns.values() {
            if !conn.send(Arc::clone(&json)) {
                counter!("ws_broadcast_drops_total").increment(1);
                warn!(session = %conn.id, "failed to deliver frame to session");
            }
        }
    }

    /// Deliver a frame to one session (e.g. `channelError`). Returns
    /// whether the frame was enqueued.
    pub async fn to_session(&self, session: &SessionId, frame: &ServerFrame) -> bool {
        let Some(json) = serialize(frame) else {
            return false;
        };
        let conns = self.connections.read().await;
        match conns.get(session) {
            Some(conn) => conn.send(json),
            None => false,
        }
    }
}

fn serialize(frame: &ServerFrame) -> Option<Arc<String>> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(Arc::new(json)),
        Err(err) => {
            warn!(frame_type = frame.frame_type, error = %err, "failed to serialize frame");
            None
        }
    }
}
