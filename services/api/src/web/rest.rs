//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Handlers validate input, enforce the role policy, call the storage port,
//! and publish a fan-out event after each successful mutation. Role-based
//! pack visibility (admin all, teacher own-subject, student published-only)
//! is applied here, not in storage.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studypack_core::domain::{
    AccountRequest, FlashcardPatch, NewFlashcard, NewPack, NewUser, Pack, PackPatch, Role, User,
    UserPatch,
};
use studypack_core::ports::PortError;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::web::auth::hash_password;
use crate::web::protocol::ServerEvent;
use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        unread_count_handler,
    ),
    components(
        schemas(HealthResponse, UnreadCountResponse)
    ),
    tags(
        (name = "Studypack API", description = "API endpoints for the flashcard study application.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Translates a port error into the HTTP status/message pair handlers return.
pub(crate) fn storage_error(e: PortError) -> (StatusCode, String) {
    error!("Storage error: {:?}", e);
    match e {
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Constraint(msg) => (StatusCode::CONFLICT, msg),
        PortError::PartialBatch { completed, reason } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Batch failed after {} operation(s): {}", completed, reason),
        ),
        PortError::Unexpected(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "An internal error occurred".to_string(),
        ),
    }
}

fn not_found(what: &str, id: Uuid) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{} {} not found", what, id))
}

fn forbidden(msg: &str) -> (StatusCode, String) {
    (StatusCode::FORBIDDEN, msg.to_string())
}

fn require_admin(user: &User) -> Result<(), (StatusCode, String)> {
    if user.role == Role::Admin {
        Ok(())
    } else {
        Err(forbidden("Admin role required"))
    }
}

/// Admins manage every subject; teachers only their own.
fn can_manage_subject(user: &User, subject: &str) -> bool {
    match user.role {
        Role::Admin => true,
        Role::Teacher => user.subject.as_deref() == Some(subject),
        Role::Student => false,
    }
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize, ToSchema)]
pub struct UnreadCountResponse {
    count: u64,
}

/// The outward user shape. The password hash never leaves the service.
#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub subject: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            subject: user.subject,
        }
    }
}

#[derive(Serialize)]
pub struct AccountRequestResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub requested_role: Role,
}

impl From<AccountRequest> for AccountRequestResponse {
    fn from(request: AccountRequest) -> Self {
        Self {
            id: request.id,
            first_name: request.first_name,
            last_name: request.last_name,
            requested_role: request.requested_role,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub role: Role,
    pub subject: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub subject: Option<String>,
}

#[derive(Deserialize)]
pub struct ApproveAccountRequestBody {
    /// Overrides the requested role; defaults to what was requested.
    pub role: Option<Role>,
}

#[derive(Deserialize)]
pub struct CreatePackRequest {
    pub title: String,
    pub description: String,
    pub subject: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub order: i32,
}

#[derive(Deserialize)]
pub struct CreateFlashcardRequest {
    pub pack_id: Uuid,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub order: i32,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub to_user_id: Uuid,
    pub content: String,
}

//=========================================================================================
// Health
//=========================================================================================

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

//=========================================================================================
// User Handlers (admin only)
//=========================================================================================

pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_admin(&user)?;
    let users = state.store.get_all_users().await.map_err(storage_error)?;
    let users: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
    Ok(Json(users))
}

pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_admin(&user)?;
    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Name must not be empty".to_string()));
    }
    let password_hash = hash_password(&req.password).map_err(|e| {
        error!("Failed to hash password: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to hash password".to_string(),
        )
    })?;

    let created = state
        .store
        .create_user(NewUser {
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            password_hash,
            role: req.role,
            subject: req.subject,
        })
        .await
        .map_err(storage_error)?;

    state.broadcast(ServerEvent::UserUpdated {
        user_id: created.id,
    });
    Ok((StatusCode::CREATED, Json(UserResponse::from(created))))
}

pub async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_admin(&user)?;
    let password_hash = match req.password.as_deref() {
        Some(plain) => Some(hash_password(plain).map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to hash password".to_string(),
            )
        })?),
        None => None,
    };

    let updated = state
        .store
        .update_user(
            id,
            UserPatch {
                first_name: req.first_name,
                last_name: req.last_name,
                password_hash,
                role: req.role,
                subject: req.subject,
            },
        )
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("User", id))?;

    state.broadcast(ServerEvent::UserUpdated { user_id: id });
    Ok(Json(UserResponse::from(updated)))
}

pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_admin(&user)?;
    if id == user.id {
        return Err((
            StatusCode::BAD_REQUEST,
            "Cannot delete your own account".to_string(),
        ));
    }
    state.store.delete_user(id).await.map_err(storage_error)?;
    state.broadcast(ServerEvent::UserDeleted { user_id: id });
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Account Request Handlers (admin only)
//=========================================================================================

pub async fn list_account_requests_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_admin(&user)?;
    let requests = state
        .store
        .get_all_account_requests()
        .await
        .map_err(storage_error)?;
    let requests: Vec<AccountRequestResponse> = requests
        .into_iter()
        .map(AccountRequestResponse::from)
        .collect();
    Ok(Json(requests))
}

pub async fn approve_account_request_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(body): Json<ApproveAccountRequestBody>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_admin(&user)?;
    let request = state
        .store
        .get_account_request(id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("Account request", id))?;

    let role = body.role.unwrap_or(request.requested_role);
    let created = state
        .store
        .approve_account_request(
            id,
            &request.first_name,
            &request.last_name,
            &request.password_hash,
            role,
        )
        .await
        .map_err(storage_error)?;

    state.broadcast(ServerEvent::AccountApproved {
        user_id: created.id,
    });
    Ok((StatusCode::CREATED, Json(UserResponse::from(created))))
}

pub async fn reject_account_request_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_admin(&user)?;
    state
        .store
        .reject_account_request(id)
        .await
        .map_err(storage_error)?;
    state.broadcast(ServerEvent::AccountRejected { request_id: id });
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Pack Handlers
//=========================================================================================

pub async fn list_packs_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let packs = state.store.get_all_packs().await.map_err(storage_error)?;
    let visible: Vec<Pack> = match user.role {
        Role::Admin => packs,
        Role::Teacher => packs
            .into_iter()
            .filter(|p| p.published || user.subject.as_deref() == Some(p.subject.as_str()))
            .collect(),
        Role::Student => packs.into_iter().filter(|p| p.published).collect(),
    };
    Ok(Json(visible))
}

pub async fn list_deleted_packs_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_admin(&user)?;
    let packs = state
        .store
        .get_deleted_packs()
        .await
        .map_err(storage_error)?;
    Ok(Json(packs))
}

pub async fn create_pack_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreatePackRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.title.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Title must not be empty".to_string()));
    }
    if !can_manage_subject(&user, &req.subject) {
        return Err(forbidden("You may only create packs for your own subject"));
    }

    let pack = state
        .store
        .create_pack(NewPack {
            title: req.title.trim().to_string(),
            description: req.description,
            subject: req.subject,
            published: req.published,
            order: req.order,
            created_by: user.id,
        })
        .await
        .map_err(storage_error)?;

    state.broadcast(ServerEvent::PackCreated { pack_id: pack.id });
    Ok((StatusCode::CREATED, Json(pack)))
}

pub async fn update_pack_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(patch): Json<PackPatch>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let pack = state
        .store
        .get_pack(id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("Pack", id))?;
    if !can_manage_subject(&user, &pack.subject) {
        return Err(forbidden("You may only edit packs for your own subject"));
    }
    if let Some(new_subject) = &patch.subject {
        if !can_manage_subject(&user, new_subject) {
            return Err(forbidden("You may only move packs within your own subject"));
        }
    }

    let updated = state
        .store
        .update_pack(id, patch)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("Pack", id))?;

    state.broadcast(ServerEvent::PackUpdated { pack_id: id });
    Ok(Json(updated))
}

pub async fn record_pack_view_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let pack = state
        .store
        .get_pack(id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("Pack", id))?;
    if user.role == Role::Student && !pack.published {
        return Err(forbidden("This pack is not published"));
    }

    let updated = state
        .store
        .increment_pack_views(id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("Pack", id))?;

    Ok(Json(updated))
}

pub async fn soft_delete_pack_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let pack = state
        .store
        .get_pack(id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("Pack", id))?;
    if !can_manage_subject(&user, &pack.subject) {
        return Err(forbidden("You may only delete packs for your own subject"));
    }

    state
        .store
        .soft_delete_pack(id)
        .await
        .map_err(storage_error)?;
    state.broadcast(ServerEvent::PackDeleted { pack_id: id });
    Ok(StatusCode::NO_CONTENT)
}

pub async fn restore_pack_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_admin(&user)?;
    let pack = state
        .store
        .get_pack(id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("Pack", id))?;
    if pack.deleted_at.is_none() {
        // Restoring an active pack is a no-op, mirroring the idempotent port.
        return Ok(StatusCode::NO_CONTENT);
    }

    state.store.restore_pack(id).await.map_err(storage_error)?;
    state.broadcast(ServerEvent::PackRestored { pack_id: id });
    Ok(StatusCode::NO_CONTENT)
}

pub async fn permanently_delete_pack_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_admin(&user)?;
    state
        .store
        .permanently_delete_pack(id)
        .await
        .map_err(storage_error)?;
    state.broadcast(ServerEvent::PackDeleted { pack_id: id });
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Flashcard Handlers
//=========================================================================================

pub async fn list_flashcards_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(pack_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let pack = state
        .store
        .get_pack(pack_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("Pack", pack_id))?;
    if user.role == Role::Student && !pack.published {
        return Err(forbidden("This pack is not published"));
    }

    let cards = state
        .store
        .get_flashcards_by_pack(pack_id)
        .await
        .map_err(storage_error)?;
    Ok(Json(cards))
}

pub async fn create_flashcard_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateFlashcardRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let pack = state
        .store
        .get_pack(req.pack_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("Pack", req.pack_id))?;
    if !can_manage_subject(&user, &pack.subject) {
        return Err(forbidden("You may only edit packs for your own subject"));
    }

    let card = state
        .store
        .create_flashcard(NewFlashcard {
            pack_id: req.pack_id,
            question: req.question,
            answer: req.answer,
            order: req.order,
        })
        .await
        .map_err(storage_error)?;

    state.broadcast(ServerEvent::FlashcardCreated {
        pack_id: card.pack_id,
        flashcard_id: card.id,
    });
    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn update_flashcard_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(patch): Json<FlashcardPatch>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let card = state
        .store
        .get_flashcard(id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("Flashcard", id))?;
    let pack = state
        .store
        .get_pack(card.pack_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("Pack", card.pack_id))?;
    if !can_manage_subject(&user, &pack.subject) {
        return Err(forbidden("You may only edit packs for your own subject"));
    }

    let updated = state
        .store
        .update_flashcard(id, patch)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("Flashcard", id))?;

    state.broadcast(ServerEvent::FlashcardUpdated {
        pack_id: updated.pack_id,
        flashcard_id: id,
    });
    Ok(Json(updated))
}

pub async fn delete_flashcard_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // Idempotent: deleting an already-missing card succeeds without an event.
    let Some(card) = state.store.get_flashcard(id).await.map_err(storage_error)? else {
        return Ok(StatusCode::NO_CONTENT);
    };
    let pack = state
        .store
        .get_pack(card.pack_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found("Pack", card.pack_id))?;
    if !can_manage_subject(&user, &pack.subject) {
        return Err(forbidden("You may only edit packs for your own subject"));
    }

    state
        .store
        .delete_flashcard(id)
        .await
        .map_err(storage_error)?;
    state.broadcast(ServerEvent::FlashcardDeleted {
        pack_id: card.pack_id,
        flashcard_id: id,
    });
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Message Handlers
//=========================================================================================

pub async fn list_recipients_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let recipients = state
        .store
        .get_valid_message_recipients(user.id, user.role)
        .await
        .map_err(storage_error)?;
    let recipients: Vec<UserResponse> =
        recipients.into_iter().map(UserResponse::from).collect();
    Ok(Json(recipients))
}

pub async fn get_conversation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(other_user_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let messages = state
        .store
        .get_messages_between(user.id, other_user_id)
        .await
        .map_err(storage_error)?;
    Ok(Json(messages))
}

pub async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.content.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Message content must not be empty".to_string(),
        ));
    }

    // Recipient validity is enforced here, before storage is touched.
    let recipients = state
        .store
        .get_valid_message_recipients(user.id, user.role)
        .await
        .map_err(storage_error)?;
    if !recipients.iter().any(|r| r.id == req.to_user_id) {
        return Err(forbidden("You may not message this user"));
    }

    let message = state
        .store
        .create_message(user.id, req.to_user_id, req.content.trim())
        .await
        .map_err(storage_error)?;

    state.broadcast(ServerEvent::MessageReceived {
        from_user_id: message.from_user_id,
        to_user_id: message.to_user_id,
    });
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_conversation_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(other_user_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .store
        .mark_conversation_as_read(user.id, other_user_id)
        .await
        .map_err(storage_error)?;
    state.broadcast(ServerEvent::NotificationsUpdated);
    Ok(StatusCode::NO_CONTENT)
}

/// Total unread messages for the authenticated user.
#[utoipa::path(
    get,
    path = "/messages/unread-count",
    responses(
        (status = 200, description = "Unread message count", body = UnreadCountResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn unread_count_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let count = state
        .store
        .get_total_unread_count(user.id)
        .await
        .map_err(storage_error)?;
    Ok(Json(UnreadCountResponse { count }))
}
