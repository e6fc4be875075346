//! Event system for per-session result broadcasting
//!
//! Each session identifier is a "room": detection records and metric
//! snapshots published for a session are delivered only to subscribers of
//! that room, in publish order.

pub mod types;

pub use types::SessionEvent;

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Event channel capacity per room (ring buffer size)
const ROOM_CHANNEL_CAPACITY: usize = 256;

/// Room-keyed event broadcaster
///
/// Publishing is fire-and-forget: events for a room nobody has joined are
/// dropped, since subscribers join asynchronously relative to session
/// creation. Per-room ordering follows the broadcast channel's FIFO
/// delivery; the single-writer-per-session assumption holds because frames
/// are processed sequentially per track.
pub struct RoomBus {
    rooms: RwLock<HashMap<String, broadcast::Sender<SessionEvent>>>,
}

impl RoomBus {
    /// Create a new room bus
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Publish an event to a room's subscribers
    ///
    /// If the room does not exist or has no active subscribers, the event is
    /// silently dropped.
    pub fn publish(&self, room: &str, event: SessionEvent) {
        let rooms = self.rooms.read();
        if let Some(tx) = rooms.get(room) {
            // If no subscribers, send returns Err which is normal
            let _ = tx.send(event);
        }
    }

    /// Join a room, creating it if needed
    ///
    /// Returns a receiver for all events published to the room after this
    /// call. A slow subscriber can lag and miss events (ring buffer).
    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<SessionEvent> {
        let mut rooms = self.rooms.write();
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Tear down a room
    ///
    /// Dropping the sender closes every subscriber's receiver, which ends
    /// their event streams.
    pub fn drop_room(&self, room: &str) {
        self.rooms.write().remove(room);
    }

    /// Number of live rooms
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Number of active subscribers in a room
    pub fn subscriber_count(&self, room: &str) -> usize {
        self.rooms
            .read()
            .get(room)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for RoomBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsSnapshot;

    fn snapshot(total_time: f64) -> SessionEvent {
        SessionEvent::MetricsUpdate(MetricsSnapshot {
            model_inference_time: 0.0,
            total_time,
            overhead_time: 0.0,
            model_fps: 0.0,
            e2e_latency_median: 0.0,
            e2e_latency_p95: 0.0,
            server_latency: 0.0,
            network_latency: 0.0,
            processed_fps: 0.0,
        })
    }

    #[tokio::test]
    async fn events_are_routed_to_the_right_room() {
        let bus = RoomBus::new();
        let mut rx_a = bus.subscribe("a");
        let mut rx_b = bus.subscribe("b");

        bus.publish("a", snapshot(1.0));

        let event = rx_a.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::MetricsUpdate(ref m) if m.total_time == 1.0));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_order_is_preserved_per_room() {
        let bus = RoomBus::new();
        let mut rx = bus.subscribe("s");

        for i in 0..5 {
            bus.publish("s", snapshot(i as f64));
        }

        for i in 0..5 {
            match rx.recv().await.unwrap() {
                SessionEvent::MetricsUpdate(m) => assert_eq!(m.total_time, i as f64),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let bus = RoomBus::new();
        // No room exists yet; must not panic or allocate a room
        bus.publish("ghost", snapshot(1.0));
        assert_eq!(bus.room_count(), 0);
    }

    #[tokio::test]
    async fn drop_room_ends_delivery() {
        let bus = RoomBus::new();
        let mut rx = bus.subscribe("s");
        assert_eq!(bus.subscriber_count("s"), 1);

        bus.drop_room("s");
        bus.publish("s", snapshot(1.0));

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert_eq!(bus.room_count(), 0);
    }
}
