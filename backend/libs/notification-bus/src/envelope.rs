//! Notification envelope carried over the bus

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of event a notification announces.
///
/// Serialized as its dotted wire name (`message.new`, `sync.completed`, ...).
/// Unknown names round-trip through [`NotificationType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    MessageNew,
    MessageRecalled,
    MessageDeleted,
    ConversationRead,
    SyncCompleted,
    Custom(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::MessageNew => "message.new",
            NotificationType::MessageRecalled => "message.recalled",
            NotificationType::MessageDeleted => "message.deleted",
            NotificationType::ConversationRead => "conversation.read",
            NotificationType::SyncCompleted => "sync.completed",
            NotificationType::Custom(s) => s,
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for NotificationType {
    fn from(s: &str) -> Self {
        match s {
            "message.new" => NotificationType::MessageNew,
            "message.recalled" => NotificationType::MessageRecalled,
            "message.deleted" => NotificationType::MessageDeleted,
            "conversation.read" => NotificationType::ConversationRead,
            "sync.completed" => NotificationType::SyncCompleted,
            custom => NotificationType::Custom(custom.to_string()),
        }
    }
}

impl From<String> for NotificationType {
    fn from(s: String) -> Self {
        NotificationType::from(s.as_str())
    }
}

impl From<NotificationType> for String {
    fn from(t: NotificationType) -> Self {
        t.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Ephemeral notification. Never persisted; delivered at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEnvelope {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<Uuid>,
    #[serde(default)]
    pub priority: Priority,
    pub payload: serde_json::Value,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl NotificationEnvelope {
    pub fn new(notification_type: NotificationType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_type,
            from_user_id: None,
            priority: Priority::Normal,
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn from_user(mut self, user_id: Uuid) -> Self {
        self.from_user_id = Some(user_id);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}
