use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use super::registry::ConnId;

pub type RoomId = i64;

/// Which connections are currently subscribed to which conversation.
///
/// Purely in-memory; it is rebuilt from scratch by clients re-joining after a
/// restart. Persisted conversation membership is the store's concern and is
/// deliberately not consulted here.
#[derive(Default)]
pub struct RoomIndex {
    rooms: RwLock<HashMap<RoomId, HashSet<ConnId>>>,
}

impl RoomIndex {
    /// Idempotent: joining a room twice leaves one subscription.
    pub async fn join(&self, room_id: RoomId, conn_id: ConnId) {
        self.rooms
            .write()
            .await
            .entry(room_id)
            .or_default()
            .insert(conn_id);
    }

    pub async fn leave(&self, room_id: RoomId, conn_id: ConnId) {
        let mut rooms = self.rooms.write().await;
        if let Some(subscribers) = rooms.get_mut(&room_id) {
            subscribers.remove(&conn_id);
            if subscribers.is_empty() {
                rooms.remove(&room_id);
            }
        }
    }

    /// Disconnect path: drop the connection from every room.
    pub async fn leave_all(&self, conn_id: ConnId) {
        self.rooms.write().await.retain(|_, subscribers| {
            subscribers.remove(&conn_id);
            !subscribers.is_empty()
        });
    }

    /// Snapshot of a room's subscribers, taken under the lock and iterated
    /// after release so fan-out never holds it during sends.
    pub async fn subscribers_of(&self, room_id: RoomId) -> Vec<ConnId> {
        self.rooms
            .read()
            .await
            .get(&room_id)
            .map(|subscribers| subscribers.iter().copied().collect())
            .unwrap_or_default()
    }
}
