//! services/api/src/web/protocol.rs
//!
//! Defines the one-way fan-out protocol between the server and connected
//! browser clients. Every mutating REST operation publishes exactly one
//! tagged event after the storage call succeeds.
//!
//! Wire shape: `{ "type": string, "data": object }`. Delivery is
//! best-effort with no acknowledgment or replay; a disconnected client
//! misses the event and converges through its periodic re-fetch. Payloads
//! are cache-invalidation hints (ids plus light context), never the
//! authoritative entity state.

use serde::Serialize;
use uuid::Uuid;

/// Represents the structured events the server pushes to every client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    PackCreated { pack_id: Uuid },
    PackUpdated { pack_id: Uuid },
    /// Covers both soft and permanent deletion; clients re-fetch listings
    /// either way.
    PackDeleted { pack_id: Uuid },
    PackRestored { pack_id: Uuid },

    FlashcardCreated { pack_id: Uuid, flashcard_id: Uuid },
    FlashcardUpdated { pack_id: Uuid, flashcard_id: Uuid },
    FlashcardDeleted { pack_id: Uuid, flashcard_id: Uuid },

    MessageReceived { from_user_id: Uuid, to_user_id: Uuid },
    /// Unread counts or pending requests changed; refresh badges.
    NotificationsUpdated,

    UserUpdated { user_id: Uuid },
    UserDeleted { user_id: Uuid },

    AccountApproved { user_id: Uuid },
    AccountRejected { request_id: Uuid },
}
