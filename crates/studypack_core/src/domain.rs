//! crates/studypack_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any storage engine; the serde derives
//! exist so adapters and the wire protocol can reuse them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages older than this many days are removed by the retention purge.
pub const MESSAGE_RETENTION_DAYS: i64 = 7;

/// The role attached to every user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

// Represents a user - used throughout app. The password hash never leaves
// the request layer; handlers map this to a response shape without it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: Role,
    /// Only meaningful for the teacher role: the one subject they may manage.
    pub subject: Option<String>,
}

/// Fields required to create a user; the backend assigns the id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: Role,
    pub subject: Option<String>,
}

/// A partial update. An absent field means "leave unchanged", never
/// "set to null".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
    pub subject: Option<String>,
}

/// A named, ordered collection of flashcards belonging to one subject.
///
/// A non-null `deleted_at` marks the pack soft-deleted: excluded from all
/// normal listings but still addressable by id for restore/permanent delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub published: bool,
    pub order: i32,
    pub views: i64,
    /// Weak owner reference, kept for lookup only.
    pub created_by: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPack {
    pub title: String,
    pub description: String,
    pub subject: String,
    pub published: bool,
    pub order: i32,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub published: Option<bool>,
    pub order: Option<i32>,
    pub views: Option<i64>,
}

/// One question/answer unit. Cannot outlive its pack: a permanent pack
/// delete cascades to its flashcards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: Uuid,
    pub pack_id: Uuid,
    pub question: String,
    pub answer: String,
    pub order: i32,
}

#[derive(Debug, Clone)]
pub struct NewFlashcard {
    pub pack_id: Uuid,
    pub question: String,
    pub answer: String,
    pub order: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlashcardPatch {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub order: Option<i32>,
}

/// A pending signup. Terminal: approved (becomes a user) or rejected
/// (deleted); never edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRequest {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub requested_role: Role,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
}

#[derive(Debug, Clone)]
pub struct NewAccountRequest {
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub requested_role: Role,
}

/// A directed text communication between two users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

/// Append-only read-receipt audit row. Written when read state flips,
/// never updated or queried back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRead {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}
