//! Conversation summaries derived from the message log
//!
//! Nothing is cached: every call rescans the viewer's messages, so a summary
//! is always consistent with the log at the time of the scan.

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::error::Result;
use crate::models::{ConversationSummary, Message};
use crate::store::MessageStore;

#[derive(Clone)]
pub struct ConversationAggregator {
    messages: MessageStore,
}

impl ConversationAggregator {
    pub fn new(messages: MessageStore) -> Self {
        Self { messages }
    }

    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let messages = self.messages.messages_involving(user_id).await?;
        Ok(summarize(user_id, messages))
    }
}

/// Group `messages` by conversation from `viewer`'s point of view.
///
/// The last message is the one with the greatest `(created_at, seq)`; output is
/// sorted by that key, most recent first.
pub fn summarize(
    viewer: &str,
    messages: impl IntoIterator<Item = Message>,
) -> Vec<ConversationSummary> {
    let mut groups: HashMap<String, (Message, i64)> = HashMap::new();

    for message in messages {
        if message.sender_id != viewer && message.receiver_id != viewer {
            continue;
        }
        let unread = i64::from(message.receiver_id == viewer && !message.is_read);

        match groups.get_mut(&message.conversation_id) {
            Some((last, count)) => {
                *count += unread;
                if (message.created_at, message.seq) > (last.created_at, last.seq) {
                    *last = message;
                }
            }
            None => {
                groups.insert(message.conversation_id.clone(), (message, unread));
            }
        }
    }

    let mut summaries: Vec<ConversationSummary> = groups
        .into_iter()
        .map(|(conversation_id, (last_message, unread_count))| {
            let other_participant = if last_message.sender_id == viewer {
                last_message.receiver_id.clone()
            } else {
                last_message.sender_id.clone()
            };
            ConversationSummary {
                conversation_id,
                other_participant,
                participant: None,
                last_message,
                unread_count,
            }
        })
        .collect();

    summaries.sort_by_key(|s| Reverse((s.last_message.created_at, s.last_message.seq)));
    summaries
}
