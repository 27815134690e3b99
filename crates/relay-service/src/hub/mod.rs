//! Room registry.
//!
//! The hub maps session ids to rooms. Rooms are created lazily on first
//! publisher join or mixer start and live for the rest of the process.
//!
//! # Locking
//!
//! The hub's map lock is only held for the map access itself. Lookups return
//! an `Arc<Room>` after the guard is dropped, so no room lock is ever taken
//! while the map lock is held.

mod room;

pub use room::{MixerSlot, Room};

use crate::observability::metrics;
use common::types::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct Hub {
    rooms: RwLock<HashMap<SessionId, Arc<Room>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a room without creating it.
    pub async fn get(&self, session_id: &SessionId) -> Option<Arc<Room>> {
        self.rooms.read().await.get(session_id).cloned()
    }

    /// Look up a room, creating it if needed.
    pub async fn get_or_create(&self, session_id: &SessionId) -> Arc<Room> {
        if let Some(room) = self.get(session_id).await {
            return room;
        }

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(session_id.clone())
            .or_insert_with(|| {
                debug!(target: "relay.hub", session_id = %session_id, "Room created");
                Arc::new(Room::new(session_id.clone()))
            })
            .clone();
        metrics::set_room_count(rooms.len());
        room
    }

    /// All known session ids, sorted.
    pub async fn list(&self) -> Vec<SessionId> {
        let mut sessions: Vec<SessionId> = self.rooms.read().await.keys().cloned().collect();
        sessions.sort();
        sessions
    }

    /// Stop every running mixer. Used at process shutdown.
    pub async fn shutdown(&self) {
        let rooms: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();

        let mut stopped = 0usize;
        for room in rooms {
            let mut slot = room.mixer().await;
            if let Some(mut process) = slot.clear() {
                process.terminate().await;
                metrics::record_mixer_stop("shutdown");
                stopped += 1;
            }
        }

        info!(target: "relay.hub", mixers_stopped = stopped, "Hub shut down");
    }
}
