mod sqlite;

pub use self::sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::events::MessageKind;

/// Denormalized sender identity attached to every broadcast message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub profile_picture: Option<String>,
}

/// A persisted message as the store hands it back. Immutable once created;
/// the hub only forwards it to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: i64,
    pub sender_id: i64,
    pub conversation_id: i64,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub user: Profile,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conversation {0} does not exist")]
    UnknownConversation(i64),
    #[error("sender {0} does not exist")]
    UnknownSender(i64),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// The durable store the hub persists through. Users, conversations and the
/// message log live behind this boundary; the hub never touches tables
/// directly.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a text message and return the stored record, including the
    /// denormalized sender profile. Fails if the conversation or sender is
    /// unknown.
    async fn create_message(
        &self,
        sender_id: i64,
        conversation_id: i64,
        body: &str,
    ) -> Result<MessageRecord, StoreError>;

    /// Fetch an already-persisted record by id. Used for file messages,
    /// which are created by the upload endpoint before the client announces
    /// them over the socket.
    async fn message_by_id(&self, message_id: i64) -> Result<Option<MessageRecord>, StoreError>;

    async fn user_profile(&self, user_id: i64) -> Result<Option<Profile>, StoreError>;
}
