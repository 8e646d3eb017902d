//! WebSocket session lifecycle — one spawned task per connection, from
//! upgrade through disconnect cleanup.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use gather_core::ids::PrincipalId;
use gather_core::wire::{ClientFrame, ServerFrame};

use crate::server::AppState;

use super::connection::{ClientConnection, SessionState};

/// Run a WebSocket session for an authenticated principal.
///
/// 1. Registers the session and sends `connection.established`
/// 2. Rejoins every room recorded for the principal (reconnect path)
/// 3. Dispatches inbound frames as join/leave intents
/// 4. Forwards outbound frames and sends periodic Pings, disconnecting
///    unresponsive clients
/// 5. Runs the full presence cleanup on transport close or shutdown
///
/// The session task serializes this session's operations; operations across
/// different sessions carry no ordering guarantee.
#[instrument(skip_all, fields(%principal))]
pub async fn run_ws_session(ws: WebSocket, principal: PrincipalId, state: AppState) {
    let session_id = state.presence.register(&principal);
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(1024);
    let connection = Arc::new(ClientConnection::new(
        session_id.clone(),
        principal.clone(),
        send_tx,
    ));
    connection.set_state(SessionState::Active);

    info!(session = %session_id, "client connected");
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    state.broadcaster.add(connection.clone()).await;

    let established = ServerFrame::connection_established(&session_id);
    if let Ok(json) = serde_json::to_string(&established) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    state.presence.restore_rooms(&session_id, &principal).await;

    // Outbound forwarder with periodic Ping frames.
    let outbound_conn = connection.clone();
    let ping_interval = state.config.heartbeat_interval();
    let pong_timeout = state.config.heartbeat_timeout();
    let outbound = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > pong_timeout
                    {
                        warn!("client unresponsive for {pong_timeout:?}, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let cancel = state.shutdown.token();
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!(session = %session_id, "server shutting down, closing session");
                break;
            }
            next = ws_rx.next() => {
                let Some(Ok(msg)) = next else { break };
                let text = match msg {
                    Message::Text(ref t) => Some(t.to_string()),
                    Message::Binary(ref data) => match std::str::from_utf8(data) {
                        Ok(s) => Some(s.to_owned()),
                        Err(_) => {
                            debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                            None
                        }
                    },
                    Message::Close(_) => {
                        info!(session = %session_id, "client sent close frame");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => {
                        connection.mark_alive();
                        None
                    }
                };
                let Some(text) = text else { continue };
                handle_frame(&text, &connection, &state).await;
            }
        }
    }

    connection.set_state(SessionState::Disconnected);
    info!(session = %session_id, "client disconnected");
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_session_duration_seconds").record(connection.age().as_secs_f64());

    outbound.abort();
    state.presence.disconnect(&session_id, &principal).await;
}

/// Parse and dispatch one inbound frame. Failures never tear the session
/// down; the session gets an explicit `channelError` instead.
async fn handle_frame(text: &str, connection: &Arc<ClientConnection>, state: &AppState) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(session = %connection.id, error = %err, "unparseable frame");
            let _ = connection.send_frame(&ServerFrame::channel_error("Unrecognized frame"));
            return;
        }
    };

    match frame {
        ClientFrame::JoinRoom { room_id } => {
            match state
                .presence
                .join_room(&connection.id, &connection.principal, &room_id)
                .await
            {
                Ok(count) => debug!(session = %connection.id, room = %room_id, count, "joined room"),
                Err(err) => {
                    warn!(session = %connection.id, room = %room_id, error = %err, "join failed");
                    let _ =
                        connection.send_frame(&ServerFrame::channel_error("Failed to join room"));
                }
            }
        }
        ClientFrame::LeaveRoom { room_id } => {
            match state
                .presence
                .leave_room(&connection.id, &connection.principal, &room_id)
                .await
            {
                Ok(remaining) => {
                    debug!(session = %connection.id, room = %room_id, remaining, "left room");
                }
                Err(err) => {
                    warn!(session = %connection.id, room = %room_id, error = %err, "leave failed");
                    let _ =
                        connection.send_frame(&ServerFrame::channel_error("Failed to leave room"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // Full WebSocket sessions need a live server and are covered by
    // tests/integration.rs. The frame dispatch helper is exercised there
    // end to end; here we pin the wire shapes it depends on.

    use gather_core::ids::SessionId;
    use gather_core::wire::{ClientFrame, ServerFrame};

    #[test]
    fn established_frame_carries_session_id() {
        let frame = ServerFrame::connection_established(&SessionId::from("s1"));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "connection.established");
        assert_eq!(json["data"]["sessionId"], "s1");
    }

    #[test]
    fn join_intent_parses_from_wire() {
        let parsed: ClientFrame =
            serde_json::from_str(r#"{"type":"joinRoom","roomId":"event:e1"}"#).unwrap();
        assert!(matches!(parsed, ClientFrame::JoinRoom { .. }));
    }
}
