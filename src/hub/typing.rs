use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use super::registry::{ConnId, UserId};
use super::rooms::RoomId;

struct Entry {
    conn_id: ConnId,
    generation: u64,
}

/// Bookkeeping for the server-side typing expiry.
///
/// The relay itself is stateless; this table only exists so a client that
/// crashes mid-typing doesn't leave subscribers showing a stale indicator
/// forever. Each `typing` arms (or refreshes) a TTL task in the hub; the
/// generation counter lets a refresh invalidate the previous task's expiry
/// without cancelling it. Generations come from a tracker-wide counter that
/// never resets, so a task armed before a `disarm` can never match an entry
/// re-armed afterwards.
#[derive(Default)]
pub struct TypingTracker {
    active: Mutex<HashMap<(RoomId, UserId), Entry>>,
    next_generation: AtomicU64,
}

impl TypingTracker {
    /// Record typing activity and return the generation the caller's expiry
    /// task should check against.
    pub async fn arm(&self, room_id: RoomId, user_id: UserId, conn_id: ConnId) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.active
            .lock()
            .await
            .insert((room_id, user_id), Entry { conn_id, generation });
        generation
    }

    /// Explicit `stop_typing` from the client cancels the pending expiry.
    pub async fn disarm(&self, room_id: RoomId, user_id: UserId) {
        self.active.lock().await.remove(&(room_id, user_id));
    }

    /// Called by an expiry task after the TTL. Removes the entry and returns
    /// the originating connection only if no newer `typing` arrived since the
    /// task was armed.
    pub async fn expire(&self, room_id: RoomId, user_id: UserId, generation: u64) -> Option<ConnId> {
        let mut active = self.active.lock().await;
        match active.get(&(room_id, user_id)) {
            Some(entry) if entry.generation == generation => {
                let conn_id = entry.conn_id;
                active.remove(&(room_id, user_id));
                Some(conn_id)
            }
            _ => None,
        }
    }

    /// Disconnect path: clear the connection's indicators and report which
    /// rooms should see a synthesized `stop_typing`.
    pub async fn drop_conn(&self, conn_id: ConnId) -> Vec<(RoomId, UserId)> {
        let mut active = self.active.lock().await;
        let mut cleared = Vec::new();
        active.retain(|&(room_id, user_id), entry| {
            if entry.conn_id == conn_id {
                cleared.push((room_id, user_id));
                false
            } else {
                true
            }
        });
        cleared
    }
}
