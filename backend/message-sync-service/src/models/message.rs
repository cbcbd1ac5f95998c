use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    Single,
    Group,
}

impl ConversationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationType::Single => "single",
            ConversationType::Group => "group",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "single" => Some(ConversationType::Single),
            "group" => Some(ConversationType::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Image,
    Voice,
    Video,
    File,
    Location,
    Card,
    Custom,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::Voice => "voice",
            ContentType::Video => "video",
            ContentType::File => "file",
            ContentType::Location => "location",
            ContentType::Card => "card",
            ContentType::Custom => "custom",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "text" => Some(ContentType::Text),
            "image" => Some(ContentType::Image),
            "voice" => Some(ContentType::Voice),
            "video" => Some(ContentType::Video),
            "file" => Some(ContentType::File),
            "location" => Some(ContentType::Location),
            "card" => Some(ContentType::Card),
            "custom" => Some(ContentType::Custom),
            _ => None,
        }
    }
}

/// Lifecycle of a stored message. Rows are never hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Normal,
    Recalled,
    Deleted,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Normal => "normal",
            MessageStatus::Recalled => "recalled",
            MessageStatus::Deleted => "deleted",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(MessageStatus::Normal),
            "recalled" => Some(MessageStatus::Recalled),
            "deleted" => Some(MessageStatus::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub conversation_type: ConversationType,
    pub sender_id: Uuid,
    pub content_type: ContentType,
    pub content: String,
    pub sequence: i64,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
    #[serde(default)]
    pub mentioned_users: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn is_visible(&self) -> bool {
        self.status == MessageStatus::Normal
    }
}

/// Input to `MessageStore::send`; the store assigns id, sequence and timestamps.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub conversation_type: ConversationType,
    pub sender_id: Uuid,
    pub content_type: ContentType,
    pub content: String,
    pub reply_to: Option<Uuid>,
    pub mentioned_users: Vec<Uuid>,
    pub local_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub keyword: String,
    pub conversation_id: Option<Uuid>,
    pub content_type: Option<ContentType>,
    pub limit: i64,
    pub offset: i64,
}

// ==================== RPC request/response types ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    pub conversation_type: ConversationType,
    pub content_type: ContentType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub at_users: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub message_id: Uuid,
    pub sequence: i64,
    /// Unix milliseconds
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesQuery {
    pub start_seq: Option<i64>,
    pub end_seq: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub reverse: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesResponse {
    pub messages: Vec<Message>,
    pub total: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMessagesQuery {
    pub conversation_id: Uuid,
    pub keyword: String,
    pub content_type: Option<ContentType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
