//! Per-client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use gather_core::ids::{PrincipalId, SessionId};
use gather_core::wire::ServerFrame;

/// Lifecycle of one session. `Disconnected` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, handshake not yet completed.
    Connecting,
    /// Handshake succeeded; intents are accepted.
    Active,
    /// Transport closed; cleanup has started.
    Disconnected,
}

/// One live real-time connection.
///
/// The principal is fixed at handshake and immutable for the session's
/// lifetime; the session id is unique per connection.
pub struct ClientConnection {
    /// Session identifier, unique per connection.
    pub id: SessionId,
    /// Owning principal, set once at handshake.
    pub principal: PrincipalId,
    /// Send channel to the connection's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last ping.
    pub is_alive: AtomicBool,
    /// When the last Pong (or any liveness signal) was received.
    last_pong: Mutex<Instant>,
    /// Messages dropped because the channel was full or closed.
    dropped_messages: AtomicU64,
    state: Mutex<SessionState>,
}

impl ClientConnection {
    /// Create a connection in the `Connecting` state.
    pub fn new(id: SessionId, principal: PrincipalId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            principal,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            state: Mutex::new(SessionState::Connecting),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Record a lifecycle transition.
    pub fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Enqueue a serialized message.
    ///
    /// Returns `false` (and counts a drop) if the channel is full or
    /// closed. Delivery is fire-and-forget.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize a frame and enqueue it.
    pub fn send_frame(&self, frame: &ServerFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or traffic received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag for the heartbeat loop.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gather_core::ids::RoomId;

    fn make_connection() -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new(SessionId::from("s1"), PrincipalId::from("alice"), tx);
        (conn, rx)
    }

    #[test]
    fn starts_connecting_with_fixed_principal() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.state(), SessionState::Connecting);
        assert_eq!(conn.principal, PrincipalId::from("alice"));
        assert!(conn.is_alive.load(Ordering::Relaxed));
    }

    #[test]
    fn state_transitions() {
        let (conn, _rx) = make_connection();
        conn.set_state(SessionState::Active);
        assert_eq!(conn.state(), SessionState::Active);
        conn.set_state(SessionState::Disconnected);
        assert_eq!(conn.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn send_delivers_to_channel() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send(Arc::new("hello".into())));
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[tokio::test]
    async fn send_to_closed_channel_counts_drop() {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new(SessionId::from("s2"), PrincipalId::from("a"), tx);
        drop(rx);
        assert!(!conn.send(Arc::new("hello".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel_counts_drop() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new(SessionId::from("s3"), PrincipalId::from("a"), tx);
        assert!(conn.send(Arc::new("msg1".into())));
        assert!(!conn.send(Arc::new("msg2".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_frame_serializes_envelope() {
        let (conn, mut rx) = make_connection();
        let frame = ServerFrame::member_joined(&RoomId::from("event:e1"), 2);
        assert!(conn.send_frame(&frame));
        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "memberJoined");
        assert_eq!(parsed["data"]["activeCount"], 2);
    }

    #[test]
    fn mark_alive_and_check_reset() {
        let (conn, _rx) = make_connection();
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn age_increases() {
        let (conn, _rx) = make_connection();
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(conn.age() > age1);
    }
}
