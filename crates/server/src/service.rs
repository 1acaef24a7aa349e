//! Messaging orchestration
//!
//! `send_message` has exactly one step that can fail the request: persisting
//! the message. Everything after it is best-effort and only logged.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::aggregator::ConversationAggregator;
use crate::conversation::{conversation_id, ensure_participant, validate_identity};
use crate::error::{Error, Result};
use crate::models::{
    self, ConversationSummary, Message, NewNotification, Notification, NotificationOptions,
    NotificationType, Page, PageRequest, RelatedEntities, SendMessageInput,
};
use crate::presence::ConnectionId;
use crate::realtime::{Hub, ServerEvent};
use crate::store::{MessageStore, NotificationStore, UserDirectory};

/// Follow-up steps of a send that never fail the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowUp {
    RoomBroadcast,
    NotificationPush,
    NotificationRecord,
}

impl FollowUp {
    fn as_str(&self) -> &'static str {
        match self {
            FollowUp::RoomBroadcast => "room broadcast",
            FollowUp::NotificationPush => "notification push",
            FollowUp::NotificationRecord => "notification record",
        }
    }
}

/// Cut `content` to `max_chars` characters, marking the cut with an ellipsis.
pub fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut cut: String = content.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

#[derive(Clone)]
pub struct MessagingService {
    messages: MessageStore,
    notifications: NotificationStore,
    aggregator: ConversationAggregator,
    directory: Arc<dyn UserDirectory>,
    hub: Arc<Hub>,
    preview_chars: usize,
}

impl MessagingService {
    pub fn new(
        messages: MessageStore,
        notifications: NotificationStore,
        directory: Arc<dyn UserDirectory>,
        hub: Arc<Hub>,
        preview_chars: usize,
    ) -> Self {
        Self {
            aggregator: ConversationAggregator::new(messages.clone()),
            messages,
            notifications,
            directory,
            hub,
            preview_chars,
        }
    }

    pub async fn send_message(&self, sender_id: &str, input: SendMessageInput) -> Result<Message> {
        validate_identity(sender_id)?;
        let receiver_id = input.receiver_id.clone();
        if self.directory.get_user_by_id(&receiver_id).await?.is_none() {
            return Err(Error::NotFound("Receiver not found".to_string()));
        }

        let message = self.messages.append(input.into_new_message(sender_id)).await?;
        info!(
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            "{} -> {}",
            sender_id,
            receiver_id
        );

        let mut outcomes: Vec<(FollowUp, Result<usize>)> = Vec::with_capacity(3);

        let event = ServerEvent::MessageReceive {
            conversation_id: message.conversation_id.clone(),
            message: message.clone(),
        };
        let except = self.hub.presence().handles_for(sender_id);
        let delivered = self.hub.to_room_except(&message.conversation_id, &event, &except);
        outcomes.push((FollowUp::RoomBroadcast, Ok(delivered)));

        let notification = Notification::from_new(self.message_notification(&message).await);
        let push = ServerEvent::NotificationNew {
            notification: notification.clone(),
        };
        let pushed = self.hub.to_user(&receiver_id, &push);
        outcomes.push((FollowUp::NotificationPush, Ok(pushed)));

        let recorded = self.notifications.insert(&notification).await.map(|_| 1);
        outcomes.push((FollowUp::NotificationRecord, recorded));

        for (step, outcome) in outcomes {
            match outcome {
                Ok(count) => debug!(message_id = %message.id, "{}: {}", step.as_str(), count),
                Err(e) => warn!(message_id = %message.id, "{} failed: {}", step.as_str(), e),
            }
        }

        Ok(message)
    }

    async fn message_notification(&self, message: &Message) -> NewNotification {
        let sender_name = match self.directory.get_user_by_id(&message.sender_id).await {
            Ok(Some(profile)) => profile.display_name,
            Ok(None) => message.sender_id.clone(),
            Err(e) => {
                warn!("sender lookup for {} failed: {}", message.sender_id, e);
                message.sender_id.clone()
            }
        };

        NewNotification::new(
            message.receiver_id.clone(),
            NotificationType::MessageReceived,
            format!("New message from {}", sender_name),
            preview(&message.content, self.preview_chars),
        )
        .with_options(NotificationOptions {
            sender_id: Some(message.sender_id.clone()),
            related: RelatedEntities {
                message_id: Some(message.id.clone()),
                deal_id: message.deal_id.clone(),
                ..Default::default()
            },
            action_url: Some(format!("/messages/{}", message.sender_id)),
            ..Default::default()
        })
    }

    /// Re-broadcast a stored message to the rest of its room, skipping the relaying connection.
    pub async fn relay_message(
        &self,
        handle: ConnectionId,
        user_id: &str,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<usize> {
        ensure_participant(conversation_id, user_id)?;
        let message = self.messages.get(message_id).await?;
        if message.conversation_id != conversation_id {
            return Err(Error::Validation(
                "Message does not belong to this conversation".to_string(),
            ));
        }
        if message.sender_id != user_id {
            return Err(Error::Forbidden("Only the sender can relay a message".to_string()));
        }

        let event = ServerEvent::MessageReceive {
            conversation_id: conversation_id.to_string(),
            message,
        };
        Ok(self
            .hub
            .to_room_except(conversation_id, &event, &HashSet::from([handle])))
    }

    pub async fn conversation_history(
        &self,
        viewer_id: &str,
        other_user_id: &str,
        page: PageRequest,
    ) -> Result<Page<Message>> {
        let id = conversation_id(viewer_id, other_user_id)?;
        self.messages.list_conversation(&id, page).await
    }

    /// Mark everything `other_user_id` sent to `viewer_id` as read.
    pub async fn mark_conversation_read(&self, viewer_id: &str, other_user_id: &str) -> Result<u64> {
        let id = conversation_id(viewer_id, other_user_id)?;
        self.messages.mark_read(&id, viewer_id).await
    }

    pub async fn list_conversations(&self, viewer_id: &str) -> Result<Vec<ConversationSummary>> {
        let mut summaries = self.aggregator.list_conversations(viewer_id).await?;
        for summary in summaries.iter_mut() {
            match self.directory.get_user_by_id(&summary.other_participant).await {
                Ok(profile) => summary.participant = profile,
                Err(e) => warn!(
                    "profile lookup for {} failed: {}",
                    summary.other_participant, e
                ),
            }
        }
        Ok(summaries)
    }

    pub async fn unread_count(&self, viewer_id: &str) -> Result<i64> {
        self.messages.count_unread_for(viewer_id).await
    }

    /// Record a notification and push it to the recipient if they are online.
    ///
    /// Already expired notifications are stored but not pushed.
    pub async fn notify(&self, new: NewNotification) -> Result<Notification> {
        let notification = self.notifications.create(new).await?;
        if notification.is_expired_at(models::now()) {
            debug!(notification_id = %notification.id, "expired on arrival, not pushed");
            return Ok(notification);
        }
        self.hub.to_user(
            &notification.recipient_id,
            &ServerEvent::NotificationNew {
                notification: notification.clone(),
            },
        );
        Ok(notification)
    }
}
