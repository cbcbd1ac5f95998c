use super::message::{ConversationType, Message};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Highest sequence a user acknowledged in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub last_read_seq: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_read_message_id: Option<Uuid>,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsReadRequest {
    pub conversation_type: ConversationType,
    pub last_read_seq: i64,
    #[serde(default)]
    pub last_read_message_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountQuery {
    pub last_read_seq: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread_count: i64,
    pub last_message_seq: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
}
