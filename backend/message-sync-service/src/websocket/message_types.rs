use crate::error::AppError;
use crate::models::{SendMessageRequest, SendMessageResponse};
use notification_bus::NotificationEnvelope;
use serde::{Deserialize, Serialize};

/// Inbound websocket frames from client to server
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientFrame {
    #[serde(rename = "message.send")]
    MessageSend(SendMessageRequest),
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

/// Outbound websocket frames from server to client
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerFrame {
    #[serde(rename = "message.sent")]
    MessageSent(SendMessageResponse),
    #[serde(rename = "notification")]
    Notification(NotificationEnvelope),
    #[serde(rename = "pong")]
    Pong,
    /// A client frame was rejected; the socket stays open
    #[serde(rename = "error")]
    Error {
        code: u32,
        error: String,
        message: String,
        #[serde(rename = "localId", skip_serializing_if = "Option::is_none")]
        local_id: Option<String>,
    },
}

impl ServerFrame {
    pub fn from_error(err: &AppError, local_id: Option<String>) -> Self {
        let kind = err.kind();
        ServerFrame::Error {
            code: kind.code(),
            error: kind.as_str().to_string(),
            message: err.public_message(),
            local_id,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
