//! services/api/src/web/state.rs
//!
//! Defines the application's shared state: the selected storage backend,
//! the fan-out channel, and the in-process auth session registry.

use crate::config::Config;
use crate::web::protocol::ServerEvent;
use std::collections::HashMap;
use std::sync::Arc;
use studypack_core::ports::StorageService;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

/// How many fan-out events are buffered per lagging subscriber before it
/// starts missing them.
const EVENT_CHANNEL_CAPACITY: usize = 128;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all
/// handlers. The storage backend is injected here at construction time; no
/// other part of the system inspects which concrete backend was selected.
pub struct AppState {
    pub store: Arc<dyn StorageService>,
    pub config: Arc<Config>,
    pub events: broadcast::Sender<ServerEvent>,
    /// Auth session registry: cookie token to user id. Process-local by
    /// design; login sessions do not outlive a restart.
    sessions: RwLock<HashMap<String, Uuid>>,
}

impl AppState {
    pub fn new(store: Arc<dyn StorageService>, config: Arc<Config>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            config,
            events,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Publishes a fan-out event to every connected client. Best-effort: a
    /// send error only means nobody is listening right now.
    pub fn broadcast(&self, event: ServerEvent) {
        if let Err(e) = self.events.send(event) {
            debug!("No WebSocket subscribers for event: {}", e);
        }
    }

    pub async fn create_auth_session(&self, user_id: Uuid) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.write().await.insert(token.clone(), user_id);
        token
    }

    pub async fn validate_auth_session(&self, token: &str) -> Option<Uuid> {
        self.sessions.read().await.get(token).copied()
    }

    pub async fn delete_auth_session(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }
}
