//! Background housekeeping

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::store::NotificationStore;

/// Purge expired notifications every `every`, starting immediately.
pub fn spawn_purge_task(notifications: NotificationStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match notifications.purge_expired().await {
                Ok(0) => debug!("no expired notifications"),
                Ok(purged) => info!("purged {} expired notifications", purged),
                Err(e) => warn!("notification purge failed: {}", e),
            }
        }
    })
}
