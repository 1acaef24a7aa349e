//! SQLite-backed storage
//!
//! One pool is shared by the message log, the notification log and the
//! user directory. Timestamps are stored as RFC 3339 text with microsecond
//! precision and a `Z` suffix so that string comparison matches time order.

pub mod messages;
pub mod notifications;
pub mod users;

pub use messages::MessageStore;
pub use notifications::{NotificationPage, NotificationStore};
pub use users::{SqliteUserDirectory, UserDirectory};

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::Error;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        avatar TEXT,
        role TEXT NOT NULL DEFAULT 'user'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        conversation_id TEXT NOT NULL,
        sender_id TEXT NOT NULL,
        receiver_id TEXT NOT NULL,
        content TEXT NOT NULL,
        message_type TEXT NOT NULL,
        attachments TEXT NOT NULL DEFAULT '[]',
        is_read INTEGER NOT NULL DEFAULT 0,
        read_at TEXT,
        deal_id TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages (conversation_id, seq)",
    "CREATE INDEX IF NOT EXISTS idx_messages_receiver_unread ON messages (receiver_id, is_read)",
    "CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages (sender_id)",
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id TEXT PRIMARY KEY,
        recipient_id TEXT NOT NULL,
        sender_id TEXT,
        kind TEXT NOT NULL,
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        campaign_id TEXT,
        application_id TEXT,
        deal_id TEXT,
        review_id TEXT,
        message_id TEXT,
        action_url TEXT,
        is_read INTEGER NOT NULL DEFAULT 0,
        read_at TEXT,
        priority TEXT NOT NULL DEFAULT 'medium',
        expires_at TEXT,
        group_key TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications (recipient_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_expiry ON notifications (expires_at)",
];

/// Open (creating if missing) the database at `path` and apply the schema.
pub async fn open(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    info!("[Store] Opened database at {:?}", path);

    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> crate::error::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Corrupt timestamp {:?}: {}", raw, e)))
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> crate::error::Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

#[cfg(test)]
pub(crate) async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = open(&dir.path().join("test.sqlite")).await.unwrap();
    (dir, pool)
}
