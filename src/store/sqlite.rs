use async_trait::async_trait;
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::events::MessageKind;

use super::{MessageRecord, MessageStore, Profile, StoreError};

/// `MessageStore` over the application's SQLite schema
/// (`users` / `conversations` / `messages`).
#[derive(Clone)]
pub struct SqliteStore {
    db_pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create_message(
        &self,
        sender_id: i64,
        conversation_id: i64,
        body: &str,
    ) -> Result<MessageRecord, StoreError> {
        let conversation: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM conversations WHERE id=?")
                .bind(conversation_id)
                .fetch_optional(&self.db_pool)
                .await?;
        if conversation.is_none() {
            return Err(StoreError::UnknownConversation(conversation_id));
        }

        let user = self
            .user_profile(sender_id)
            .await?
            .ok_or(StoreError::UnknownSender(sender_id))?;

        let created_at = OffsetDateTime::now_utc();
        let result = sqlx::query(
            "INSERT INTO messages (sender_id,conversation_id,message,type,created_at) VALUES (?,?,?,'text',?)",
        )
        .bind(sender_id)
        .bind(conversation_id)
        .bind(body)
        .bind(created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(MessageRecord {
            id: result.last_insert_rowid(),
            sender_id,
            conversation_id,
            message: body.to_owned(),
            kind: MessageKind::Text,
            original_name: None,
            file_type: None,
            file_size: None,
            created_at,
            user,
        })
    }

    async fn message_by_id(&self, message_id: i64) -> Result<Option<MessageRecord>, StoreError> {
        type Row = (
            i64,
            i64,
            String,
            String,
            Option<String>,
            Option<String>,
            Option<i64>,
            OffsetDateTime,
        );
        let Some((
            sender_id,
            conversation_id,
            message,
            kind,
            original_name,
            file_type,
            file_size,
            created_at,
        )): Option<Row> = sqlx::query_as(
            "SELECT sender_id,conversation_id,message,type,original_name,file_type,file_size,created_at \
             FROM messages WHERE id=?",
        )
        .bind(message_id)
        .fetch_optional(&self.db_pool)
        .await?
        else {
            return Ok(None);
        };

        let user = self
            .user_profile(sender_id)
            .await?
            .ok_or(StoreError::UnknownSender(sender_id))?;

        Ok(Some(MessageRecord {
            id: message_id,
            sender_id,
            conversation_id,
            message,
            kind: match kind.as_str() {
                "file" => MessageKind::File,
                _ => MessageKind::Text,
            },
            original_name,
            file_type,
            file_size,
            created_at,
            user,
        }))
    }

    async fn user_profile(&self, user_id: i64) -> Result<Option<Profile>, StoreError> {
        let row: Option<(i64, String, Option<String>)> =
            sqlx::query_as("SELECT id,name,profile_picture FROM users WHERE id=?")
                .bind(user_id)
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(row.map(|(id, name, profile_picture)| Profile {
            id,
            name,
            profile_picture,
        }))
    }
}
