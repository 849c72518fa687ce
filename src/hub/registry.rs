use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::events::ServerEvent;

pub type ConnId = Uuid;
pub type UserId = i64;

struct Conn {
    user_id: Option<UserId>,
    tx: UnboundedSender<ServerEvent>,
}

/// Tracks every live connection and which user it belongs to, once known.
///
/// Both maps sit behind one lock so the by-user index can never disagree
/// with the connection table. `unregister` is the only cleanup entry point;
/// room and call teardown hang off its return value in [`super::Hub`].
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    conns: HashMap<ConnId, Conn>,
    by_user: HashMap<UserId, ConnId>,
}

impl Registry {
    pub async fn register(&self, tx: UnboundedSender<ServerEvent>) -> ConnId {
        let conn_id = Uuid::new_v4();
        self.inner
            .write()
            .await
            .conns
            .insert(conn_id, Conn { user_id: None, tx });
        conn_id
    }

    /// Bind a user to a connection. The most recent identification wins: if
    /// the user already had another connection mapped, call routing now
    /// targets this one.
    pub async fn identify(&self, conn_id: ConnId, user_id: UserId) {
        let mut inner = self.inner.write().await;
        let Some(conn) = inner.conns.get_mut(&conn_id) else {
            return;
        };
        let previous = conn.user_id.replace(user_id);
        if let Some(previous) = previous
            && previous != user_id
            && inner.by_user.get(&previous) == Some(&conn_id)
        {
            inner.by_user.remove(&previous);
        }
        inner.by_user.insert(user_id, conn_id);
    }

    pub async fn user_of(&self, conn_id: ConnId) -> Option<UserId> {
        self.inner.read().await.conns.get(&conn_id)?.user_id
    }

    /// Zero-or-one connection per user; only the most recently identified
    /// connection is findable.
    pub async fn lookup_by_user(&self, user_id: UserId) -> Option<ConnId> {
        self.inner.read().await.by_user.get(&user_id).copied()
    }

    pub async fn sender_of(&self, conn_id: ConnId) -> Option<UnboundedSender<ServerEvent>> {
        Some(self.inner.read().await.conns.get(&conn_id)?.tx.clone())
    }

    /// Snapshot the senders for a set of connections under one read lock.
    /// Connections that vanished in the meantime are skipped.
    pub async fn senders_for(&self, conn_ids: &[ConnId]) -> Vec<UnboundedSender<ServerEvent>> {
        let inner = self.inner.read().await;
        conn_ids
            .iter()
            .filter_map(|conn_id| Some(inner.conns.get(conn_id)?.tx.clone()))
            .collect()
    }

    /// Drop the connection. Returns the user it was the active route for —
    /// `None` for a connection that was never identified or was superseded
    /// by a newer `identify`, so the caller only tears down per-user state
    /// (call sessions) when the user really went away.
    pub async fn unregister(&self, conn_id: ConnId) -> Option<UserId> {
        let mut inner = self.inner.write().await;
        let conn = inner.conns.remove(&conn_id)?;
        let user_id = conn.user_id?;
        if inner.by_user.get(&user_id) != Some(&conn_id) {
            return None;
        }
        inner.by_user.remove(&user_id);
        Some(user_id)
    }
}
