//! Per-room realtime fan-out.
//!
//! Every room gets its own bounded broadcast channel. Delivery is
//! at-least-once from the consumer's perspective and there is no queued
//! history: a late subscriber (or one the channel dropped for lagging)
//! must bootstrap via a direct fetch, not replay.

use crate::protocol::RoomEvent;
use crate::types::RoomId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Registry of per-room event channels. Channels are created with the room
/// and dropped with it.
#[derive(Clone, Default)]
pub struct RoomEvents {
    senders: Arc<RwLock<HashMap<RoomId, broadcast::Sender<RoomEvent>>>>,
}

impl RoomEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the channel for a new room.
    pub async fn register(&self, room_id: &RoomId) {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        self.senders.write().await.insert(room_id.clone(), tx);
    }

    /// Drop the channel for a deleted room. Subscribers see the stream end.
    pub async fn remove(&self, room_id: &RoomId) {
        self.senders.write().await.remove(room_id);
    }

    /// Subscribe to a room's events. Returns None for unknown rooms.
    pub async fn subscribe(&self, room_id: &RoomId) -> Option<broadcast::Receiver<RoomEvent>> {
        self.senders
            .read()
            .await
            .get(room_id)
            .map(|tx| tx.subscribe())
    }

    /// Publish an event to a room's subscribers. Send errors (no receivers
    /// connected) are fine and ignored.
    pub async fn publish(&self, event: RoomEvent) {
        let senders = self.senders.read().await;
        if let Some(tx) = senders.get(event.room_id()) {
            let _ = tx.send(event);
        }
    }
}
