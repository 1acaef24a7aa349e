//! Notification records and their closed type enumeration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ApplicationReceived,
    ApplicationAccepted,
    ApplicationRejected,
    DealCreated,
    DealUpdated,
    DealCompleted,
    DealCancelled,
    ReviewReceived,
    MessageReceived,
    PaymentReceived,
    PaymentReleased,
    SystemAnnouncement,
}

impl NotificationType {
    pub const ALL: [NotificationType; 12] = [
        NotificationType::ApplicationReceived,
        NotificationType::ApplicationAccepted,
        NotificationType::ApplicationRejected,
        NotificationType::DealCreated,
        NotificationType::DealUpdated,
        NotificationType::DealCompleted,
        NotificationType::DealCancelled,
        NotificationType::ReviewReceived,
        NotificationType::MessageReceived,
        NotificationType::PaymentReceived,
        NotificationType::PaymentReleased,
        NotificationType::SystemAnnouncement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ApplicationReceived => "application_received",
            NotificationType::ApplicationAccepted => "application_accepted",
            NotificationType::ApplicationRejected => "application_rejected",
            NotificationType::DealCreated => "deal_created",
            NotificationType::DealUpdated => "deal_updated",
            NotificationType::DealCompleted => "deal_completed",
            NotificationType::DealCancelled => "deal_cancelled",
            NotificationType::ReviewReceived => "review_received",
            NotificationType::MessageReceived => "message_received",
            NotificationType::PaymentReceived => "payment_received",
            NotificationType::PaymentReleased => "payment_released",
            NotificationType::SystemAnnouncement => "system_announcement",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("Unknown notification type: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(Error::Validation(format!("Unknown priority: {}", other))),
        }
    }
}

/// Optional links from a notification to the entities it is about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedEntities {
    pub campaign_id: Option<String>,
    pub application_id: Option<String>,
    pub deal_id: Option<String>,
    pub review_id: Option<String>,
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub related: RelatedEntities,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub expires_at: Option<DateTime<Utc>>,
    pub group_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Materialize an unsaved, unread notification with a fresh id.
    pub fn from_new(new: NewNotification) -> Self {
        let NewNotification {
            recipient_id,
            kind,
            title,
            message,
            options,
        } = new;

        Self {
            id: Uuid::new_v4().to_string(),
            recipient_id,
            sender_id: options.sender_id,
            kind,
            title,
            message,
            related: options.related,
            action_url: options.action_url,
            is_read: false,
            read_at: None,
            priority: options.priority,
            expires_at: options.expires_at,
            group_key: options.group_key,
            created_at: super::now(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at < now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotificationOptions {
    pub sender_id: Option<String>,
    pub related: RelatedEntities,
    pub action_url: Option<String>,
    pub priority: Priority,
    pub expires_at: Option<DateTime<Utc>>,
    /// Unread notifications sharing a group key collapse into one row
    pub group_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: String,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub options: NotificationOptions,
}

impl NewNotification {
    pub fn new(
        recipient_id: impl Into<String>,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            options: NotificationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: NotificationOptions) -> Self {
        self.options = options;
        self
    }
}
