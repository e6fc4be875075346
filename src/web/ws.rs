//! WebSocket handler for real-time event streaming
//!
//! This module provides a WebSocket endpoint at `/api/ws` that joins a
//! session's room and relays its detection results and metric snapshots in
//! publish order. Clients may join before the session exists; they simply
//! receive events once publishing starts.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::SessionEvent;
use crate::state::AppState;

/// Query parameters for the event channel
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Room to join
    pub session_id: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.session_id))
}

/// Relay room events to one WebSocket client
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let (mut sender, mut receiver) = socket.split();

    let mut event_rx = state.events.subscribe(&session_id);

    info!("WebSocket client joined room {}", session_id);

    // Heartbeat interval (30 seconds)
    let mut heartbeat_interval = tokio::time::interval(tokio::time::Duration::from_secs(30));

    loop {
        tokio::select! {
            // Receive message from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(_))) => {
                        debug!("Received ping from client");
                    }
                    Some(Ok(Message::Pong(_))) => {
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client left room {}", session_id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            // Receive event from the room
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Ok(json) = serialize_event(&event) {
                            if sender.send(Message::Text(json)).await.is_err() {
                                warn!("Failed to send event to client, disconnecting");
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged by {} events in room {}", n, session_id);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Room torn down with the session
                        info!("Room {} closed, disconnecting client", session_id);
                        break;
                    }
                }
            }

            // Heartbeat
            _ = heartbeat_interval.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    warn!("Failed to send ping, disconnecting");
                    break;
                }
            }
        }
    }

    info!("WebSocket handler exiting for room {}", session_id);
}

/// Serialize an event to a JSON string
fn serialize_event(event: &SessionEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectionRecord;

    #[test]
    fn serialized_events_carry_their_wire_tag() {
        let record = DetectionRecord::new(0, 1, 1, 1, vec![]).unwrap();
        let json = serialize_event(&SessionEvent::DetectionResult(record)).unwrap();
        assert!(json.contains("\"type\":\"detection_result\""));
    }
}
