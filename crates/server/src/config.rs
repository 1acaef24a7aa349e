//! Chat server configuration

use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::presence::PresenceTracker;
use crate::realtime::Hub;
use crate::service::MessagingService;
use crate::store::{MessageStore, NotificationStore, UserDirectory};

/// Configuration for the chat server
#[derive(Clone, Debug)]
pub struct ChatServerConfig {
    /// Directory holding the SQLite database
    pub data_dir: PathBuf,
    /// Address the HTTP listener binds to
    pub bind_addr: String,
    /// Longest accepted message body, in characters
    pub max_message_len: usize,
    /// Characters of the message kept in notification previews
    pub preview_chars: usize,
    /// Outbound queue depth per realtime connection
    pub channel_capacity: usize,
    /// How often expired notifications are purged
    pub purge_interval: Duration,
}

impl Default for ChatServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("chat_data"),
            bind_addr: "0.0.0.0:3001".to_string(),
            max_message_len: 5000,
            preview_chars: 100,
            channel_capacity: 100,
            purge_interval: Duration::from_secs(3600),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("ignoring unparsable {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

impl ChatServerConfig {
    /// Defaults overridden by `CHAT_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("CHAT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            bind_addr: env_or("CHAT_BIND_ADDR", defaults.bind_addr),
            max_message_len: env_or("CHAT_MAX_MESSAGE_LEN", defaults.max_message_len),
            preview_chars: env_or("CHAT_PREVIEW_CHARS", defaults.preview_chars),
            channel_capacity: env_or("CHAT_CHANNEL_CAPACITY", defaults.channel_capacity),
            purge_interval: Duration::from_secs(env_or(
                "CHAT_PURGE_INTERVAL_SECS",
                defaults.purge_interval.as_secs(),
            )),
        }
    }

    /// Create config with a custom data directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("chat.sqlite")
    }

    /// Ensure the data directory exists
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ChatServerConfig>,
    pub notifications: NotificationStore,
    pub directory: Arc<dyn UserDirectory>,
    pub presence: Arc<PresenceTracker>,
    pub hub: Arc<Hub>,
    pub service: MessagingService,
}

impl AppState {
    pub async fn new(
        config: ChatServerConfig,
        pool: SqlitePool,
        directory: Arc<dyn UserDirectory>,
    ) -> crate::error::Result<Self> {
        let messages = MessageStore::open(pool.clone(), config.max_message_len).await?;
        let notifications = NotificationStore::new(pool);
        let presence = Arc::new(PresenceTracker::new());
        let hub = Arc::new(Hub::new(presence.clone(), config.channel_capacity));
        let service = MessagingService::new(
            messages,
            notifications.clone(),
            directory.clone(),
            hub.clone(),
            config.preview_chars,
        );

        Ok(Self {
            config: Arc::new(config),
            notifications,
            directory,
            presence,
            hub,
            service,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChatServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:3001");
        assert_eq!(config.max_message_len, 5000);
        assert_eq!(config.preview_chars, 100);
        assert_eq!(config.purge_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_with_base_dir() {
        let config = ChatServerConfig::with_base_dir("/tmp/parley");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/parley/chat.sqlite"));
        assert_eq!(config.channel_capacity, 100);
    }

    #[tokio::test]
    async fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChatServerConfig::with_base_dir(dir.path().join("nested/data"));
        config.ensure_dirs().await.unwrap();
        assert!(config.data_dir.is_dir());
    }
}
