//! Durable per-recipient notification log

use sqlx::SqlitePool;
use tracing::{debug, info};

use super::{format_ts, parse_opt_ts, parse_ts};
use crate::error::{Error, Result};
use crate::models::{
    self, NewNotification, Notification, PageRequest, RelatedEntities,
};

const NOTIFICATION_COLUMNS: &str = "id, recipient_id, sender_id, kind, title, message, \
     campaign_id, application_id, deal_id, review_id, message_id, action_url, is_read, \
     read_at, priority, expires_at, group_key, created_at";

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    recipient_id: String,
    sender_id: Option<String>,
    kind: String,
    title: String,
    message: String,
    campaign_id: Option<String>,
    application_id: Option<String>,
    deal_id: Option<String>,
    review_id: Option<String>,
    message_id: Option<String>,
    action_url: Option<String>,
    is_read: bool,
    read_at: Option<String>,
    priority: String,
    expires_at: Option<String>,
    group_key: Option<String>,
    created_at: String,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = Error;

    fn try_from(row: NotificationRow) -> Result<Self> {
        let corrupt = |e: Error| Error::Internal(e.to_string());
        Ok(Notification {
            id: row.id,
            recipient_id: row.recipient_id,
            sender_id: row.sender_id,
            kind: row.kind.parse().map_err(corrupt)?,
            title: row.title,
            message: row.message,
            related: RelatedEntities {
                campaign_id: row.campaign_id,
                application_id: row.application_id,
                deal_id: row.deal_id,
                review_id: row.review_id,
                message_id: row.message_id,
            },
            action_url: row.action_url,
            is_read: row.is_read,
            read_at: parse_opt_ts(row.read_at)?,
            priority: row.priority.parse().map_err(corrupt)?,
            expires_at: parse_opt_ts(row.expires_at)?,
            group_key: row.group_key,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

/// A page of notifications plus the counters the inbox needs
#[derive(Debug, Clone)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub total: i64,
    pub unread_count: i64,
}

#[derive(Clone)]
pub struct NotificationStore {
    pool: SqlitePool,
}

impl NotificationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn validate(new: &NewNotification) -> Result<()> {
        if new.recipient_id.trim().is_empty() {
            return Err(Error::Validation("Notification recipient is required".to_string()));
        }
        if new.title.trim().is_empty() || new.message.trim().is_empty() {
            return Err(Error::Validation(
                "Notification title and message are required".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a notification.
    ///
    /// With a group key, an unread notification of the same group for the same
    /// recipient is refreshed in place instead of stacking a new one.
    pub async fn create(&self, new: NewNotification) -> Result<Notification> {
        Self::validate(&new)?;
        let notification = Notification::from_new(new);

        let Some(group_key) = notification.group_key.clone() else {
            self.insert(&notification).await?;
            return Ok(notification);
        };

        let mut tx = self.pool.begin().await?;
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM notifications \
             WHERE recipient_id = ? AND group_key = ? AND is_read = 0 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(&notification.recipient_id)
        .bind(&group_key)
        .fetch_optional(&mut *tx)
        .await?;

        let notification = match existing {
            Some(id) => {
                let related = &notification.related;
                sqlx::query(
                    "UPDATE notifications SET sender_id = ?, kind = ?, title = ?, message = ?, \
                     campaign_id = ?, application_id = ?, deal_id = ?, review_id = ?, \
                     message_id = ?, action_url = ?, priority = ?, expires_at = ?, \
                     created_at = ? WHERE id = ?",
                )
                .bind(&notification.sender_id)
                .bind(notification.kind.as_str())
                .bind(&notification.title)
                .bind(&notification.message)
                .bind(&related.campaign_id)
                .bind(&related.application_id)
                .bind(&related.deal_id)
                .bind(&related.review_id)
                .bind(&related.message_id)
                .bind(&notification.action_url)
                .bind(notification.priority.as_str())
                .bind(notification.expires_at.as_ref().map(format_ts))
                .bind(format_ts(&notification.created_at))
                .bind(&id)
                .execute(&mut *tx)
                .await?;
                debug!(notification_id = %id, group_key = %group_key, "refreshed grouped notification");
                Notification { id, ..notification }
            }
            None => {
                insert_row(&mut *tx, &notification).await?;
                notification
            }
        };
        tx.commit().await?;

        Ok(notification)
    }

    /// Persist a notification value built by the caller.
    pub async fn insert(&self, notification: &Notification) -> Result<()> {
        insert_row(&self.pool, notification).await?;
        debug!(
            notification_id = %notification.id,
            recipient_id = %notification.recipient_id,
            kind = %notification.kind,
            "stored notification"
        );
        Ok(())
    }

    async fn fetch(&self, notification_id: &str) -> Result<Notification> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE id = ?",
            NOTIFICATION_COLUMNS
        );
        let row: Option<NotificationRow> = sqlx::query_as(&sql)
            .bind(notification_id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| Error::NotFound(format!("Notification {} not found", notification_id)))?
            .try_into()
    }

    async fn fetch_owned(&self, notification_id: &str, requester_id: &str) -> Result<Notification> {
        let notification = self.fetch(notification_id).await?;
        if notification.recipient_id != requester_id {
            return Err(Error::Forbidden(
                "Not authorized to access this notification".to_string(),
            ));
        }
        Ok(notification)
    }

    /// Newest first. Expired rows stay listed until the purge removes them.
    pub async fn list_for(
        &self,
        user_id: &str,
        page: PageRequest,
        unread_only: bool,
    ) -> Result<NotificationPage> {
        let filter = if unread_only {
            "recipient_id = ? AND is_read = 0"
        } else {
            "recipient_id = ?"
        };

        let mut tx = self.pool.begin().await?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM notifications WHERE {}", filter))
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;

        let unread_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let sql = format!(
            "SELECT {} FROM notifications WHERE {} \
             ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            NOTIFICATION_COLUMNS, filter
        );
        let rows: Vec<NotificationRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(i64::from(page.limit))
            .bind(page.offset())
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let items = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(NotificationPage {
            items,
            total,
            unread_count,
        })
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn mark_read(&self, notification_id: &str, requester_id: &str) -> Result<Notification> {
        let mut notification = self.fetch_owned(notification_id, requester_id).await?;
        if notification.is_read {
            return Ok(notification);
        }

        let read_at = models::now();
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = ? WHERE id = ? AND is_read = 0",
        )
        .bind(format_ts(&read_at))
        .bind(notification_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Lost a race with another reader; report what is stored.
            return self.fetch(notification_id).await;
        }

        notification.is_read = true;
        notification.read_at = Some(read_at);
        Ok(notification)
    }

    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = ? WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(format_ts(&models::now()))
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, notification_id: &str, requester_id: &str) -> Result<()> {
        self.fetch_owned(notification_id, requester_id).await?;
        sqlx::query("DELETE FROM notifications WHERE id = ? AND recipient_id = ?")
            .bind(notification_id)
            .bind(requester_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove notifications whose expiry has passed. Maintenance only.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM notifications WHERE expires_at IS NOT NULL AND expires_at < ?",
        )
        .bind(format_ts(&models::now()))
        .execute(&self.pool)
        .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!(purged, "purged expired notifications");
        }
        Ok(purged)
    }
}

async fn insert_row<'e, E>(executor: E, n: &Notification) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO notifications (id, recipient_id, sender_id, kind, title, message, \
         campaign_id, application_id, deal_id, review_id, message_id, action_url, is_read, \
         read_at, priority, expires_at, group_key, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&n.id)
    .bind(&n.recipient_id)
    .bind(&n.sender_id)
    .bind(n.kind.as_str())
    .bind(&n.title)
    .bind(&n.message)
    .bind(&n.related.campaign_id)
    .bind(&n.related.application_id)
    .bind(&n.related.deal_id)
    .bind(&n.related.review_id)
    .bind(&n.related.message_id)
    .bind(&n.action_url)
    .bind(n.is_read)
    .bind(n.read_at.as_ref().map(format_ts))
    .bind(n.priority.as_str())
    .bind(n.expires_at.as_ref().map(format_ts))
    .bind(&n.group_key)
    .bind(format_ts(&n.created_at))
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationOptions, NotificationType, Priority};
    use crate::store::test_pool;
    use chrono::{Duration, Utc};

    fn announcement(recipient: &str, title: &str) -> NewNotification {
        NewNotification::new(recipient, NotificationType::SystemAnnouncement, title, "body")
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (_dir, pool) = test_pool().await;
        let store = NotificationStore::new(pool);

        let first = store.create(announcement("bob", "first")).await.unwrap();
        let second = store
            .create(announcement("bob", "second").with_options(NotificationOptions {
                priority: Priority::Urgent,
                sender_id: Some("alice".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        store.create(announcement("carol", "other")).await.unwrap();

        let page = store.list_for("bob", PageRequest::new(1, 20), false).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.unread_count, 2);
        assert_eq!(page.items[0].id, second.id);
        assert_eq!(page.items[0].priority, Priority::Urgent);
        assert_eq!(page.items[0].sender_id.as_deref(), Some("alice"));
        assert_eq!(page.items[1].id, first.id);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_fields() {
        let (_dir, pool) = test_pool().await;
        let store = NotificationStore::new(pool);
        assert!(matches!(
            store.create(announcement("bob", "  ")).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_group_key_refreshes_unread() {
        let (_dir, pool) = test_pool().await;
        let store = NotificationStore::new(pool);

        let grouped = |title: &str| {
            announcement("bob", title).with_options(NotificationOptions {
                group_key: Some("deal:7".into()),
                ..Default::default()
            })
        };

        let first = store.create(grouped("v1")).await.unwrap();
        let second = store.create(grouped("v2")).await.unwrap();
        assert_eq!(first.id, second.id);

        let page = store.list_for("bob", PageRequest::new(1, 20), false).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].title, "v2");

        store.mark_read(&first.id, "bob").await.unwrap();
        let third = store.create(grouped("v3")).await.unwrap();
        assert_ne!(third.id, first.id);
    }

    #[tokio::test]
    async fn test_group_refresh_matches_stored_row() {
        let (_dir, pool) = test_pool().await;
        let store = NotificationStore::new(pool);

        let deal = |kind, deal_id: &str, message_id: Option<&str>| {
            NewNotification::new("bob", kind, "Deal news", "something changed").with_options(
                NotificationOptions {
                    related: RelatedEntities {
                        deal_id: Some(deal_id.into()),
                        message_id: message_id.map(Into::into),
                        ..Default::default()
                    },
                    group_key: Some("deal:7".into()),
                    ..Default::default()
                },
            )
        };

        let first = store
            .create(deal(NotificationType::DealCreated, "7", Some("m1")))
            .await
            .unwrap();
        let refreshed = store
            .create(deal(NotificationType::DealUpdated, "7b", None))
            .await
            .unwrap();
        assert_eq!(refreshed.id, first.id);

        let stored = store.fetch(&first.id).await.unwrap();
        assert_eq!(stored, refreshed);
        assert_eq!(stored.kind, NotificationType::DealUpdated);
        assert_eq!(stored.related.deal_id.as_deref(), Some("7b"));
        assert_eq!(stored.related.message_id, None);
    }

    #[tokio::test]
    async fn test_mark_read_authorization() {
        let (_dir, pool) = test_pool().await;
        let store = NotificationStore::new(pool);
        let n = store.create(announcement("bob", "hi")).await.unwrap();

        assert!(matches!(
            store.mark_read(&n.id, "carol").await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            store.mark_read("missing", "bob").await,
            Err(Error::NotFound(_))
        ));

        let read = store.mark_read(&n.id, "bob").await.unwrap();
        assert!(read.is_read);
        let read_at = read.read_at.unwrap();

        let again = store.mark_read(&n.id, "bob").await.unwrap();
        assert_eq!(again.read_at, Some(read_at));
        assert_eq!(store.unread_count("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_all_read_and_unread_filter() {
        let (_dir, pool) = test_pool().await;
        let store = NotificationStore::new(pool);
        for i in 0..3 {
            store.create(announcement("bob", &format!("n{}", i))).await.unwrap();
        }
        store.create(announcement("carol", "c")).await.unwrap();

        let unread = store.list_for("bob", PageRequest::new(1, 20), true).await.unwrap();
        assert_eq!(unread.total, 3);

        assert_eq!(store.mark_all_read("bob").await.unwrap(), 3);
        assert_eq!(store.mark_all_read("bob").await.unwrap(), 0);

        let unread = store.list_for("bob", PageRequest::new(1, 20), true).await.unwrap();
        assert_eq!(unread.total, 0);
        assert!(unread.items.is_empty());
        let all = store.list_for("bob", PageRequest::new(1, 20), false).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(store.unread_count("carol").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_authorization() {
        let (_dir, pool) = test_pool().await;
        let store = NotificationStore::new(pool);
        let n = store.create(announcement("bob", "bye")).await.unwrap();

        assert!(matches!(
            store.delete(&n.id, "carol").await,
            Err(Error::Forbidden(_))
        ));
        store.delete(&n.id, "bob").await.unwrap();
        assert!(matches!(
            store.delete(&n.id, "bob").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (_dir, pool) = test_pool().await;
        let store = NotificationStore::new(pool);

        let expired = store
            .create(announcement("bob", "old").with_options(NotificationOptions {
                expires_at: Some(Utc::now() - Duration::hours(1)),
                ..Default::default()
            }))
            .await
            .unwrap();
        let fresh = store
            .create(announcement("bob", "new").with_options(NotificationOptions {
                expires_at: Some(Utc::now() + Duration::hours(1)),
                ..Default::default()
            }))
            .await
            .unwrap();
        store.create(announcement("bob", "forever")).await.unwrap();

        let before = store.list_for("bob", PageRequest::new(1, 20), false).await.unwrap();
        assert!(before.items.iter().any(|n| n.id == expired.id));

        assert_eq!(store.purge_expired().await.unwrap(), 1);

        let after = store.list_for("bob", PageRequest::new(1, 20), false).await.unwrap();
        assert_eq!(after.total, 2);
        assert!(after.items.iter().all(|n| n.id != expired.id));
        assert!(after.items.iter().any(|n| n.id == fresh.id));
    }
}
