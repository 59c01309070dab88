use serde::{Deserialize, Serialize};
use serde_json::json;

/// Message types on the remote-control channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    // Client -> Server
    Buzz,
    Stop,

    // Server -> Client
    Bound,
    Error,
}

/// Base structure for remote-control messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebSocketMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuzzPayload {
    pub speed: Option<f64>,
}

impl WebSocketMessage {
    pub fn bound(room: &str) -> Self {
        Self {
            message_type: MessageType::Bound,
            payload: json!({ "room": room }),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Error,
            payload: json!({ "message": message.into() }),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"ERROR","payload":{}}"#.to_string())
    }
}
