use super::message::{ConversationType, Message};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client's last-known sequence for one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationCursor {
    pub conversation_id: Uuid,
    pub last_seq: i64,
}

/// Messages a device is missing in one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDelta {
    pub conversation_id: Uuid,
    pub messages: Vec<Message>,
    pub has_more: bool,
    /// Highest sequence included, or the cursor when nothing new arrived
    pub last_seq: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendSummary {
    pub user_id: Uuid,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub group_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub member_count: i64,
    #[serde(default)]
    pub is_dismissed: bool,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub conversation_type: ConversationType,
    #[serde(default)]
    pub last_message: Option<serde_json::Value>,
    #[serde(default)]
    pub unread_count: i64,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_muted: bool,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Unix milliseconds of the last successful sync; 0 requests a full sync
    #[serde(default)]
    pub last_sync_time: i64,
    #[serde(default)]
    pub conversation_cursors: Vec<ConversationCursor>,
    #[serde(default)]
    pub limit_per_conversation: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// `None` when the relationship domain could not be reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friends: Option<Vec<FriendSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<GroupSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<SessionSummary>>,
    pub conversations: Vec<ConversationDelta>,
    pub sync_time: i64,
    pub full_sync: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessagesRequest {
    #[serde(default)]
    pub conversation_cursors: Vec<ConversationCursor>,
    #[serde(default)]
    pub limit_per_conversation: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessagesResponse {
    pub conversations: Vec<ConversationDelta>,
}
