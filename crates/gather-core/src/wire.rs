//! Real-time channel wire frames.
//!
//! Inbound frames are the client's subscribe intents; outbound frames use a
//! `{type, timestamp, data}` envelope so clients can dispatch on `type`
//! without knowing every payload shape.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{EventId, RoomId, SessionId};
use crate::model::EventSnapshot;

// ── Outbound event type names ───────────────────────────────────────

/// Sent once after a successful handshake.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";
/// Room membership increased.
pub const MEMBER_JOINED: &str = "memberJoined";
/// Room membership decreased.
pub const MEMBER_LEFT: &str = "memberLeft";
/// Canonical post-mutation state of a resource.
pub const RESOURCE_UPDATED: &str = "resourceUpdated";
/// Resource removed.
pub const RESOURCE_DELETED: &str = "resourceDeleted";
/// An operation on this session failed.
pub const CHANNEL_ERROR: &str = "channelError";

/// Frame sent by a client over the real-time channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Subscribe intent for a room.
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        /// The room to subscribe to.
        room_id: RoomId,
    },
    /// Unsubscribe intent for a room.
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        /// The room to unsubscribe from.
        room_id: RoomId,
    },
}

/// Frame pushed by the server over the real-time channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFrame {
    /// Frame type (e.g. `memberJoined`).
    #[serde(rename = "type")]
    pub frame_type: String,
    /// ISO-8601 timestamp with millisecond precision.
    pub timestamp: String,
    /// Frame payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ServerFrame {
    /// Build a frame with the current UTC timestamp.
    pub fn new(frame_type: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            frame_type: frame_type.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            data,
        }
    }

    /// `connection.established {sessionId}`.
    #[must_use]
    pub fn connection_established(session: &SessionId) -> Self {
        Self::new(
            CONNECTION_ESTABLISHED,
            Some(serde_json::json!({ "sessionId": session })),
        )
    }

    /// `memberJoined {roomId, activeCount}`.
    #[must_use]
    pub fn member_joined(room: &RoomId, active_count: usize) -> Self {
        Self::new(
            MEMBER_JOINED,
            Some(serde_json::json!({ "roomId": room, "activeCount": active_count })),
        )
    }

    /// `memberLeft {roomId, activeCount}`.
    #[must_use]
    pub fn member_left(room: &RoomId, active_count: usize) -> Self {
        Self::new(
            MEMBER_LEFT,
            Some(serde_json::json!({ "roomId": room, "activeCount": active_count })),
        )
    }

    /// `resourceUpdated {resourceId, snapshot, timestamp}`.
    #[must_use]
    pub fn resource_updated(snapshot: &EventSnapshot) -> Self {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let data = serde_json::json!({
            "resourceId": snapshot.id,
            "snapshot": snapshot,
            "timestamp": timestamp.clone(),
        });
        Self {
            frame_type: RESOURCE_UPDATED.to_owned(),
            timestamp,
            data: Some(data),
        }
    }

    /// `resourceDeleted {resourceId}`.
    #[must_use]
    pub fn resource_deleted(event: &EventId) -> Self {
        Self::new(
            RESOURCE_DELETED,
            Some(serde_json::json!({ "resourceId": event })),
        )
    }

    /// `channelError {message}`.
    pub fn channel_error(message: impl Into<String>) -> Self {
        Self::new(
            CHANNEL_ERROR,
            Some(serde_json::json!({ "message": message.into() })),
        )
    }
}
