//! services/api/src/web/ws_handler.rs
//!
//! The WebSocket fan-out endpoint. Each connection subscribes to the shared
//! broadcast channel and forwards every event as a JSON text frame. The
//! channel is one-way: inbound frames other than Close are ignored. A client
//! that lags far enough to overflow its buffer simply misses those events
//! and converges through its periodic re-fetch.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use studypack_core::domain::User;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::web::state::AppState;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>, // from auth middleware
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user: User) {
    info!("New WebSocket connection established for user: {}", user.id);

    let (mut sender, mut receiver) = socket.split();
    let mut events = app_state.events.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        info!("Client went away mid-send.");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Missed events are fine; the client re-fetches on poll.
                    warn!("Client {} lagged, skipped {} events", user.id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) => {
                    info!("Client sent close message.");
                    break;
                }
                Some(Ok(_)) => {
                    // One-way channel; nothing to do with client frames.
                }
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
                None => {
                    info!("Client disconnected.");
                    break;
                }
            },
        }
    }

    info!("WebSocket connection closed for user: {}", user.id);
}
