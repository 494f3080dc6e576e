//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for signup, login, and logout. Signup does not
//! create a user directly: it files an account request that an admin later
//! approves or rejects.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studypack_core::domain::{NewAccountRequest, Role};
use tracing::error;
use uuid::Uuid;

use crate::web::rest::storage_error;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize)]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub requested_role: Role,
}

#[derive(Serialize)]
pub struct SignupResponse {
    pub request_id: Uuid,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub subject: Option<String>,
}

//=========================================================================================
// Password Hashing
//=========================================================================================

/// Hashes a plaintext password with argon2 and a fresh salt.
pub fn hash_password(plain: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(plain.as_bytes(), &salt)?
        .to_string())
}

fn verify_password(plain: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - File a pending account request
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Name must not be empty".to_string()));
    }
    if req.password.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Password must not be empty".to_string()));
    }
    if req.requested_role == Role::Admin {
        return Err((
            StatusCode::BAD_REQUEST,
            "Admin accounts cannot be requested".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password).map_err(|e| {
        error!("Failed to hash password: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to hash password".to_string(),
        )
    })?;

    let request = state
        .store
        .create_account_request(NewAccountRequest {
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            password_hash,
            requested_role: req.requested_role,
        })
        .await
        .map_err(storage_error)?;

    state.broadcast(crate::web::protocol::ServerEvent::NotificationsUpdated);

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            request_id: request.id,
        }),
    ))
}

/// POST /auth/login - Login with an existing account
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let users = state.store.get_all_users().await.map_err(storage_error)?;
    let user = users
        .into_iter()
        .find(|u| u.first_name == req.first_name && u.last_name == req.last_name)
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Invalid name or password".to_string(),
        ))?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err((
            StatusCode::UNAUTHORIZED,
            "Invalid name or password".to_string(),
        ));
    }

    let token = state.create_auth_session(user.id).await;
    let cookie = format!(
        "session={}; HttpOnly; SameSite=Lax; Path=/",
        token
    );

    let response = AuthResponse {
        user_id: user.id,
        first_name: user.first_name,
        last_name: user.last_name,
        role: user.role.as_str().to_string(),
        subject: user.subject,
    };

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// POST /auth/logout - Logout and invalidate the session
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    let token = cookie_header
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state.delete_auth_session(token).await;

    let cookie = "session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0";
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}
