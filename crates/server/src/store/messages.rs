//! Append-only message log
//!
//! Messages are grouped by conversation id. The only mutable state is the
//! read flag, and it only ever moves from unread to read.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{format_ts, parse_opt_ts, parse_ts};
use crate::conversation::conversation_id;
use crate::error::{Error, Result};
use crate::models::{self, Attachment, Message, NewMessage, Page, PageRequest};

const MESSAGE_COLUMNS: &str = "seq, id, conversation_id, sender_id, receiver_id, content, \
     message_type, attachments, is_read, read_at, deal_id, created_at";

#[derive(sqlx::FromRow)]
struct MessageRow {
    seq: i64,
    id: String,
    conversation_id: String,
    sender_id: String,
    receiver_id: String,
    content: String,
    message_type: String,
    attachments: String,
    is_read: bool,
    read_at: Option<String>,
    deal_id: Option<String>,
    created_at: String,
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        let attachments: Vec<Attachment> = serde_json::from_str(&row.attachments)?;
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            content: row.content,
            message_type: row
                .message_type
                .parse()
                .map_err(|e: Error| Error::Internal(e.to_string()))?,
            attachments,
            is_read: row.is_read,
            read_at: parse_opt_ts(row.read_at)?,
            deal_id: row.deal_id,
            created_at: parse_ts(&row.created_at)?,
            seq: row.seq,
        })
    }
}

fn into_messages(rows: Vec<MessageRow>) -> Result<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
    /// Last assigned `created_at`; held across the insert so time order and seq order agree
    clock: Arc<Mutex<DateTime<Utc>>>,
    max_content_len: usize,
}

impl MessageStore {
    /// Open the log over `pool`, resuming the clock from the newest stored message.
    pub async fn open(pool: SqlitePool, max_content_len: usize) -> Result<Self> {
        let newest: Option<String> = sqlx::query_scalar("SELECT MAX(created_at) FROM messages")
            .fetch_one(&pool)
            .await?;
        let last = match newest {
            Some(raw) => parse_ts(&raw)?,
            None => DateTime::<Utc>::MIN_UTC,
        };

        Ok(Self {
            pool,
            clock: Arc::new(Mutex::new(last)),
            max_content_len,
        })
    }

    fn validate(&self, new: &NewMessage) -> Result<String> {
        let content = new.content.trim();
        if content.is_empty() {
            return Err(Error::Validation("Message content is required".to_string()));
        }
        if content.chars().count() > self.max_content_len {
            return Err(Error::Validation(format!(
                "Message content exceeds {} characters",
                self.max_content_len
            )));
        }
        if let Some(bad) = new
            .attachments
            .iter()
            .find(|a| a.name.trim().is_empty() || a.url.trim().is_empty())
        {
            return Err(Error::Validation(format!(
                "Attachment {:?} needs a name and a url",
                bad.name
            )));
        }
        Ok(content.to_string())
    }

    /// Persist a new message. Receiver existence is the caller's concern.
    pub async fn append(&self, new: NewMessage) -> Result<Message> {
        let content = self.validate(&new)?;
        let conversation_id = conversation_id(&new.sender_id, &new.receiver_id)?;
        let attachments = serde_json::to_string(&new.attachments)?;
        let id = Uuid::new_v4().to_string();

        let mut last = self.clock.lock().await;
        let created_at = models::now().max(*last);

        let result = sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, content, \
             message_type, attachments, is_read, deal_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(&conversation_id)
        .bind(&new.sender_id)
        .bind(&new.receiver_id)
        .bind(&content)
        .bind(new.message_type.as_str())
        .bind(&attachments)
        .bind(&new.deal_id)
        .bind(format_ts(&created_at))
        .execute(&self.pool)
        .await?;

        *last = created_at;
        drop(last);

        let seq = result.last_insert_rowid();
        debug!(message_id = %id, conversation_id = %conversation_id, seq, "appended message");

        Ok(Message {
            id,
            conversation_id,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            content,
            message_type: new.message_type,
            attachments: new.attachments,
            is_read: false,
            read_at: None,
            deal_id: new.deal_id,
            created_at,
            seq,
        })
    }

    pub async fn get(&self, message_id: &str) -> Result<Message> {
        let sql = format!("SELECT {} FROM messages WHERE id = ?", MESSAGE_COLUMNS);
        let row: Option<MessageRow> = sqlx::query_as(&sql)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| Error::NotFound(format!("Message {} not found", message_id)))?
            .try_into()
    }

    /// One page of a conversation, paged newest-first and returned oldest-first.
    pub async fn list_conversation(
        &self,
        conversation_id: &str,
        page: PageRequest,
    ) -> Result<Page<Message>> {
        let mut tx = self.pool.begin().await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
                .bind(conversation_id)
                .fetch_one(&mut *tx)
                .await?;

        let sql = format!(
            "SELECT {} FROM messages WHERE conversation_id = ? ORDER BY seq DESC LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS
        );
        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(conversation_id)
            .bind(i64::from(page.limit))
            .bind(page.offset())
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut items = into_messages(rows)?;
        items.reverse();
        Ok(Page { items, total })
    }

    /// Mark every unread message addressed to `receiver_id` in the conversation as read.
    ///
    /// A single UPDATE, so concurrent appends are either fully in or fully out.
    pub async fn mark_read(&self, conversation_id: &str, receiver_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1, read_at = ? \
             WHERE conversation_id = ? AND receiver_id = ? AND is_read = 0",
        )
        .bind(format_ts(&models::now()))
        .bind(conversation_id)
        .bind(receiver_id)
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected();
        if updated > 0 {
            info!(conversation_id, receiver_id, updated, "marked messages read");
        }
        Ok(updated)
    }

    pub async fn count_unread_for(&self, user_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE receiver_id = ? AND is_read = 0")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Every message the user sent or received, in insertion order.
    pub async fn messages_involving(&self, user_id: &str) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE sender_id = ? OR receiver_id = ? ORDER BY seq",
            MESSAGE_COLUMNS
        );
        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        into_messages(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;
    use crate::store::test_pool;

    fn text(sender: &str, receiver: &str, content: &str) -> NewMessage {
        NewMessage {
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            content: content.to_string(),
            message_type: MessageType::Text,
            attachments: vec![],
            deal_id: None,
        }
    }

    #[tokio::test]
    async fn test_append_assigns_conversation_and_unread() {
        let (_dir, pool) = test_pool().await;
        let store = MessageStore::open(pool, 100).await.unwrap();

        let msg = store.append(text("alice", "bob", " hello ")).await.unwrap();
        assert_eq!(msg.conversation_id, "alice:bob");
        assert_eq!(msg.content, "hello");
        assert!(!msg.is_read);
        assert!(msg.read_at.is_none());

        let loaded = store.get(&msg.id).await.unwrap();
        assert_eq!(loaded, msg);
    }

    #[tokio::test]
    async fn test_append_rejects_bad_content() {
        let (_dir, pool) = test_pool().await;
        let store = MessageStore::open(pool, 5).await.unwrap();

        assert!(matches!(
            store.append(text("alice", "bob", "   ")).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.append(text("alice", "bob", "too long")).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.append(text("alice", "alice", "self")).await,
            Err(Error::Validation(_))
        ));

        let mut with_attachment = text("alice", "bob", "pic");
        with_attachment.attachments.push(Attachment {
            name: "a.png".into(),
            url: "".into(),
            mime_type: "image/png".into(),
            size: 10,
        });
        assert!(matches!(
            store.append(with_attachment).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_attachments_keep_order() {
        let (_dir, pool) = test_pool().await;
        let store = MessageStore::open(pool, 100).await.unwrap();

        let mut new = text("alice", "bob", "files");
        new.message_type = MessageType::File;
        for name in ["b.pdf", "a.pdf"] {
            new.attachments.push(Attachment {
                name: name.into(),
                url: format!("https://cdn.example/{}", name),
                mime_type: "application/pdf".into(),
                size: 42,
            });
        }
        let msg = store.append(new).await.unwrap();
        let loaded = store.get(&msg.id).await.unwrap();
        assert_eq!(loaded.attachments[0].name, "b.pdf");
        assert_eq!(loaded.attachments[1].name, "a.pdf");
        assert_eq!(loaded.message_type, MessageType::File);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, pool) = test_pool().await;
        let store = MessageStore::open(pool, 100).await.unwrap();
        assert!(matches!(store.get("nope").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_conversation_pages_are_chronological() {
        let (_dir, pool) = test_pool().await;
        let store = MessageStore::open(pool, 100).await.unwrap();

        for i in 0..5 {
            let (from, to) = if i % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
            store.append(text(from, to, &format!("m{}", i))).await.unwrap();
        }
        store.append(text("alice", "carol", "other")).await.unwrap();

        let id = conversation_id("bob", "alice").unwrap();
        let newest = store.list_conversation(&id, PageRequest::new(1, 2)).await.unwrap();
        assert_eq!(newest.total, 5);
        let contents: Vec<_> = newest.items.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);

        let older = store.list_conversation(&id, PageRequest::new(2, 2)).await.unwrap();
        let contents: Vec<_> = older.items.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m2"]);

        let past_end = store.list_conversation(&id, PageRequest::new(9, 2)).await.unwrap();
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 5);
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent_and_scoped() {
        let (_dir, pool) = test_pool().await;
        let store = MessageStore::open(pool, 100).await.unwrap();

        store.append(text("alice", "bob", "one")).await.unwrap();
        store.append(text("alice", "bob", "two")).await.unwrap();
        store.append(text("bob", "alice", "reply")).await.unwrap();
        store.append(text("carol", "bob", "hey")).await.unwrap();

        assert_eq!(store.count_unread_for("bob").await.unwrap(), 3);

        let id = conversation_id("alice", "bob").unwrap();
        assert_eq!(store.mark_read(&id, "bob").await.unwrap(), 2);
        assert_eq!(store.mark_read(&id, "bob").await.unwrap(), 0);

        assert_eq!(store.count_unread_for("bob").await.unwrap(), 1);
        assert_eq!(store.count_unread_for("alice").await.unwrap(), 1);

        let page = store.list_conversation(&id, PageRequest::new(1, 10)).await.unwrap();
        for msg in page.items {
            if msg.receiver_id == "bob" {
                assert!(msg.is_read);
                assert!(msg.read_at.is_some());
            } else {
                assert!(!msg.is_read);
            }
        }
    }

    #[tokio::test]
    async fn test_seq_and_time_are_monotonic() {
        let (_dir, pool) = test_pool().await;
        let store = MessageStore::open(pool, 100).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append(text("alice", "bob", &format!("c{}", i))).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let all = store.messages_involving("alice").await.unwrap();
        assert_eq!(all.len(), 20);
        for pair in all.windows(2) {
            assert!(pair[0].seq < pair[1].seq);
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn test_reopened_store_resumes_clock() {
        let (_dir, pool) = test_pool().await;
        let store = MessageStore::open(pool.clone(), 100).await.unwrap();
        let before = store.append(text("alice", "bob", "before restart")).await.unwrap();

        // stored rows may be ahead of the wall clock after a clock step back
        sqlx::query("UPDATE messages SET created_at = ? WHERE id = ?")
            .bind("2099-01-01T00:00:00.000000Z")
            .bind(&before.id)
            .execute(&pool)
            .await
            .unwrap();
        let before = store.get(&before.id).await.unwrap();

        let reopened = MessageStore::open(pool, 100).await.unwrap();
        let after = reopened.append(text("bob", "alice", "after restart")).await.unwrap();
        assert!(after.created_at >= before.created_at);
        assert!(after.seq > before.seq);

        let all = reopened.messages_involving("alice").await.unwrap();
        let summaries = crate::aggregator::summarize("alice", all);
        assert_eq!(summaries[0].last_message.content, "after restart");
    }
}
