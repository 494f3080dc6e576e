//! crates/studypack_core/src/ports.rs
//!
//! Defines the storage contract (trait) for the application's core logic.
//! The trait forms the boundary of the hexagonal architecture, allowing the
//! core to be independent of the physical engine behind it. Three adapters
//! implement it: relational (sqlx/SQLite), document store (redb), in-memory.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    AccountRequest, Flashcard, FlashcardPatch, Message, NewAccountRequest, NewFlashcard, NewPack,
    NewUser, Pack, PackPatch, Role, User, UserPatch,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the underlying engines.
///
/// Absence of an entity on a read or update is NOT an error; those
/// operations return `Option` instead. `NotFound` is reserved for
/// operations the contract defines as failing on absence (approving a
/// missing account request).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Constraint violated: {0}")]
    Constraint(String),
    #[error("Batch failed after {completed} operation(s): {reason}")]
    PartialBatch { completed: usize, reason: String },
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Port (Trait)
//=========================================================================================

/// The uniform storage contract every backend must satisfy with identical
/// external semantics.
///
/// Listing order is part of the contract: active packs and flashcards by
/// `order` ascending, deleted packs by `deleted_at` descending, messages by
/// `created_at` ascending. Deletes are idempotent; deleting a missing id is
/// not an error.
#[async_trait]
pub trait StorageService: Send + Sync {
    // --- Users ---
    //
    // The (first_name, last_name) pair is a natural key: login resolves
    // accounts by it. Creating or renaming a user into a taken pair fails
    // with `PortError::Constraint` on every backend.
    async fn get_user(&self, id: Uuid) -> PortResult<Option<User>>;
    async fn get_all_users(&self) -> PortResult<Vec<User>>;
    async fn count_users(&self) -> PortResult<u64>;
    async fn create_user(&self, new: NewUser) -> PortResult<User>;
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> PortResult<Option<User>>;
    async fn delete_user(&self, id: Uuid) -> PortResult<()>;

    // --- Packs ---
    async fn get_pack(&self, id: Uuid) -> PortResult<Option<Pack>>;
    /// Active packs only (soft-deleted excluded), ordered by `order` ascending.
    async fn get_all_packs(&self) -> PortResult<Vec<Pack>>;
    /// Soft-deleted packs, most recently deleted first.
    async fn get_deleted_packs(&self) -> PortResult<Vec<Pack>>;
    async fn create_pack(&self, new: NewPack) -> PortResult<Pack>;
    async fn update_pack(&self, id: Uuid, patch: PackPatch) -> PortResult<Option<Pack>>;
    /// Adds one view to the pack's counter as a single storage operation, so
    /// concurrent views never lose increments.
    async fn increment_pack_views(&self, id: Uuid) -> PortResult<Option<Pack>>;
    async fn soft_delete_pack(&self, id: Uuid) -> PortResult<()>;
    async fn restore_pack(&self, id: Uuid) -> PortResult<()>;
    /// Removes the pack and all of its flashcards. Flashcards are deleted
    /// before, or atomically with, the pack row so no orphans are visible.
    async fn permanently_delete_pack(&self, id: Uuid) -> PortResult<()>;

    // --- Flashcards ---
    async fn get_flashcard(&self, id: Uuid) -> PortResult<Option<Flashcard>>;
    async fn get_flashcards_by_pack(&self, pack_id: Uuid) -> PortResult<Vec<Flashcard>>;
    async fn create_flashcard(&self, new: NewFlashcard) -> PortResult<Flashcard>;
    async fn update_flashcard(
        &self,
        id: Uuid,
        patch: FlashcardPatch,
    ) -> PortResult<Option<Flashcard>>;
    async fn delete_flashcard(&self, id: Uuid) -> PortResult<()>;

    // --- Account requests ---
    async fn get_account_request(&self, id: Uuid) -> PortResult<Option<AccountRequest>>;
    async fn get_all_account_requests(&self) -> PortResult<Vec<AccountRequest>>;
    async fn create_account_request(&self, new: NewAccountRequest) -> PortResult<AccountRequest>;
    /// Consumes the request and creates the user. Fails with
    /// `PortError::NotFound` if the request is absent.
    async fn approve_account_request(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
        password_hash: &str,
        role: Role,
    ) -> PortResult<User>;
    async fn reject_account_request(&self, id: Uuid) -> PortResult<()>;

    // --- Messages ---
    async fn create_message(
        &self,
        from_user_id: Uuid,
        to_user_id: Uuid,
        content: &str,
    ) -> PortResult<Message>;
    /// The conversation between two users, oldest first.
    async fn get_messages_between(&self, user_a: Uuid, user_b: Uuid) -> PortResult<Vec<Message>>;
    /// Recipient policy: an admin may message anyone except themselves; a
    /// non-admin may message only admins (excluding themselves). This lives
    /// in storage so every backend enforces it identically.
    async fn get_valid_message_recipients(
        &self,
        user_id: Uuid,
        role: Role,
    ) -> PortResult<Vec<User>>;
    async fn get_total_unread_count(&self, user_id: Uuid) -> PortResult<u64>;
    async fn mark_message_read(&self, id: Uuid) -> PortResult<()>;
    /// Marks every message sent by `other_user_id` to `user_id` as read.
    async fn mark_conversation_as_read(
        &self,
        user_id: Uuid,
        other_user_id: Uuid,
    ) -> PortResult<()>;
    /// Purges messages strictly older than the retention window and returns
    /// how many were removed.
    async fn delete_old_messages(&self) -> PortResult<u64>;
}

/// Shared recipient-policy predicate used by every backend so the rule is
/// specified exactly once.
pub fn is_valid_recipient(sender_id: Uuid, sender_role: Role, candidate: &User) -> bool {
    if candidate.id == sender_id {
        return false;
    }
    match sender_role {
        Role::Admin => true,
        _ => candidate.role == Role::Admin,
    }
}
