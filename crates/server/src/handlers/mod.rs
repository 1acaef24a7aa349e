//! HTTP handlers
//!
//! Every handler below runs behind `mw_require_ctx` except `health_check`.

pub mod messages;
pub mod notifications;
pub mod presence;

pub use messages::{
    conversation_history, list_conversations, mark_conversation_read, send_message, unread_count,
};
pub use notifications::{
    delete_notification, list_notifications, mark_all_notifications_read, mark_notification_read,
};
pub use presence::{get_presence, list_online};

use serde::Serialize;

/// `{"updated": n}` for bulk read-state changes
#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub updated: u64,
}

/// GET /health
pub async fn health_check() -> &'static str {
    "OK - Parley Chat Server"
}
