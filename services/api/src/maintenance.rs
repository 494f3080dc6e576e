//! services/api/src/maintenance.rs
//!
//! The scheduled retention purge: old messages are removed once at startup
//! and then on a fixed 24-hour interval. The purge criterion is a closed
//! time boundary (strictly older than the retention window), so a message
//! created while the purge runs can never be race-deleted.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::web::protocol::ServerEvent;
use crate::web::state::AppState;

const PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Spawns the background purge loop. The first tick fires immediately.
pub fn spawn_message_purge(app_state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match app_state.store.delete_old_messages().await {
                Ok(0) => {}
                Ok(purged) => {
                    info!("Retention purge removed {} old message(s)", purged);
                    app_state.broadcast(ServerEvent::NotificationsUpdated);
                }
                Err(e) => error!("Retention purge failed: {:?}", e),
            }
        }
    })
}
