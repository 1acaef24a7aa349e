//! Parley Chat Server Library
//!
//! Direct messages, presence, typing signals and notifications over
//! HTTP and WebSockets, persisted in SQLite.

pub mod aggregator;
pub mod config;
pub mod conversation;
pub mod error;
pub mod handlers;
pub mod maintenance;
pub mod models;
pub mod presence;
pub mod realtime;
pub mod service;
pub mod store;
pub mod web;

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{AppState, ChatServerConfig};
use store::SqliteUserDirectory;

pub use error::{Error, Result};

pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Already set when embedded; ignore
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    info!("=== Parley Chat Server ===");

    let config = ChatServerConfig::from_env();
    config.ensure_dirs().await?;
    info!("Data directory: {:?}", config.data_dir);

    let pool = store::open(&config.database_path()).await?;

    let directory = Arc::new(SqliteUserDirectory::new(pool.clone()));
    let app_state = AppState::new(config.clone(), pool, directory).await?;

    let _purge = maintenance::spawn_purge_task(
        app_state.notifications.clone(),
        config.purge_interval,
    );
    info!("Notification purge every {:?}", config.purge_interval);

    let app = web::router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
