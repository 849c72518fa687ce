use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::MessageRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Audio,
    Video,
}

/// One inbound frame: `{"event": "...", "data": {...}}`.
///
/// Unknown event names or payloads that don't match the schema fail to
/// deserialize; the dispatch loop answers those with an `error` event and
/// keeps the connection alive.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "identify", rename_all = "camelCase")]
    Identify { user_id: i64 },

    #[serde(rename = "join_conversation", rename_all = "camelCase")]
    JoinConversation { conversation_id: i64 },

    #[serde(rename = "leave_conversation", rename_all = "camelCase")]
    LeaveConversation { conversation_id: i64 },

    #[serde(rename = "send_message", rename_all = "camelCase")]
    SendMessage {
        conversation_id: i64,
        sender_id: i64,
        #[serde(default)]
        message: String,
        #[serde(rename = "type")]
        kind: MessageKind,
        /// Id of the already-persisted record, required when `kind` is `file`.
        #[serde(default)]
        message_id: Option<i64>,
    },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing { conversation_id: i64, user_id: i64 },

    #[serde(rename = "stop_typing", rename_all = "camelCase")]
    StopTyping { conversation_id: i64, user_id: i64 },

    #[serde(rename = "call:initiate", rename_all = "camelCase")]
    CallInitiate {
        to_user_id: i64,
        from_user_id: i64,
        call_type: CallKind,
        offer: Value,
    },

    #[serde(rename = "call:answer", rename_all = "camelCase")]
    CallAnswer {
        to_user_id: i64,
        from_user_id: i64,
        answer: Value,
    },

    #[serde(rename = "call:reject", rename_all = "camelCase")]
    CallReject { to_user_id: i64, from_user_id: i64 },

    #[serde(rename = "call:ice-candidate", rename_all = "camelCase")]
    CallIceCandidate {
        to_user_id: i64,
        from_user_id: i64,
        candidate: Value,
    },

    #[serde(rename = "call:end", rename_all = "camelCase")]
    CallEnd { to_user_id: i64, from_user_id: i64 },
}

/// One outbound frame, serialized as `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "identified", rename_all = "camelCase")]
    Identified { user_id: i64 },

    #[serde(rename = "new_message")]
    NewMessage(MessageRecord),

    #[serde(rename = "send_message_error", rename_all = "camelCase")]
    SendMessageError { message: String },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing { conversation_id: i64, user_id: i64 },

    #[serde(rename = "stop_typing", rename_all = "camelCase")]
    StopTyping { conversation_id: i64, user_id: i64 },

    #[serde(rename = "call:incoming", rename_all = "camelCase")]
    CallIncoming {
        from_user_id: i64,
        call_type: CallKind,
        offer: Value,
    },

    #[serde(rename = "call:answered", rename_all = "camelCase")]
    CallAnswered { answer: Value },

    #[serde(rename = "call:rejected", rename_all = "camelCase")]
    CallRejected { from_user_id: i64 },

    #[serde(rename = "call:ice-candidate", rename_all = "camelCase")]
    CallIceCandidate { from_user_id: i64, candidate: Value },

    #[serde(rename = "call:ended", rename_all = "camelCase")]
    CallEnded { from_user_id: i64 },

    #[serde(rename = "call:failed", rename_all = "camelCase")]
    CallFailed {
        to_user_id: i64,
        reason: CallFailure,
    },

    #[serde(rename = "error", rename_all = "camelCase")]
    Error { message: String },
}

/// Why a `call:initiate` could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallFailure {
    /// The target user has no live connection.
    Offline,
    /// A call between these two users is already pending or active.
    Busy,
}
