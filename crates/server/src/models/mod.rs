use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub mod notification;

pub use notification::{
    NewNotification, Notification, NotificationOptions, NotificationType, Priority,
    RelatedEntities,
};

/// Current time at the precision timestamps are persisted with
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A single direct message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub attachments: Vec<Attachment>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub deal_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Store-assigned insertion order; breaks ties between equal `created_at`
    pub seq: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::System => "system",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "file" => Ok(MessageType::File),
            "system" => Ok(MessageType::System),
            other => Err(Error::Validation(format!("Unknown message type: {}", other))),
        }
    }
}

/// File attached to a message; the bytes live elsewhere, only the reference is kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub mime_type: String,
    pub size: u64,
}

/// Input for appending a message to the store
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub attachments: Vec<Attachment>,
    pub deal_id: Option<String>,
}

/// Body of `POST /messages`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageInput {
    pub receiver_id: String,
    pub content: String,
    #[serde(default, rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub deal_id: Option<String>,
}

impl SendMessageInput {
    pub fn text(receiver_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            receiver_id: receiver_id.into(),
            content: content.into(),
            message_type: MessageType::Text,
            attachments: Vec::new(),
            deal_id: None,
        }
    }

    pub fn into_new_message(self, sender_id: impl Into<String>) -> NewMessage {
        NewMessage {
            sender_id: sender_id.into(),
            receiver_id: self.receiver_id,
            content: self.content,
            message_type: self.message_type,
            attachments: self.attachments,
            deal_id: self.deal_id,
        }
    }
}

/// Public profile served by the user directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub role: String,
}

/// Per-viewer summary of one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub other_participant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<UserProfile>,
    pub last_message: Message,
    pub unread_count: i64,
}

/// Presence of a single user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceStatus {
    pub user_id: String,
    pub online: bool,
}

/// Typing signal relayed inside a conversation room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub conversation_id: String,
    pub user_id: String,
}

pub const MAX_PAGE_SIZE: u32 = 100;

/// Offset-based page selector, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

/// Query string `?page=&limit=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn to_request(&self, default_limit: u32) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(1), self.limit.unwrap_or(default_limit))
    }
}

/// One page of results plus the total across all pages
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: i64) -> Self {
        let limit = i64::from(request.limit);
        Self {
            page: request.page,
            limit: request.limit,
            total,
            pages: (total + limit - 1) / limit,
        }
    }
}
