//! Wire format of realtime frames
//!
//! Every frame is a JSON text message `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::models::{Message, Notification, TypingSignal};

/// Events pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    #[serde(rename = "message:receive")]
    MessageReceive {
        conversation_id: String,
        message: Message,
    },
    #[serde(rename = "typing:start")]
    TypingStart(TypingSignal),
    #[serde(rename = "typing:stop")]
    TypingStop(TypingSignal),
    #[serde(rename = "presence:online")]
    PresenceOnline { user_id: String },
    #[serde(rename = "presence:offline")]
    PresenceOffline { user_id: String },
    #[serde(rename = "notification:new")]
    NotificationNew { notification: Notification },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::MessageReceive { .. } => "message:receive",
            ServerEvent::TypingStart(_) => "typing:start",
            ServerEvent::TypingStop(_) => "typing:stop",
            ServerEvent::PresenceOnline { .. } => "presence:online",
            ServerEvent::PresenceOffline { .. } => "presence:offline",
            ServerEvent::NotificationNew { .. } => "notification:new",
            ServerEvent::Error { .. } => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}

/// Reference to an already persisted message; other fields in the frame are ignored
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

/// Frames accepted from clients
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    #[serde(rename = "presence:join")]
    PresenceJoin { user_id: String },
    #[serde(rename = "room:join")]
    RoomJoin { conversation_id: String },
    #[serde(rename = "room:leave")]
    RoomLeave { conversation_id: String },
    #[serde(rename = "message:send")]
    MessageSend {
        conversation_id: String,
        message: MessageRef,
    },
    #[serde(rename = "typing:start")]
    TypingStart { conversation_id: String },
    #[serde(rename = "typing:stop")]
    TypingStop { conversation_id: String },
}
