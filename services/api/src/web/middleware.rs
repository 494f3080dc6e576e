//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;

use crate::web::state::AppState;

/// Middleware that validates the auth session cookie and loads the
/// authenticated user.
///
/// If valid, inserts the `User` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract cookie header
    let cookie_header = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Parse session token from cookie
    let token = cookie_header
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 3. Resolve the session to a user id
    let user_id = state
        .validate_auth_session(token)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 4. Load the user; a session for a since-deleted user is invalid
    let user = state
        .store
        .get_user(user_id)
        .await
        .map_err(|e| {
            error!("Failed to load user for session: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 5. Insert the user into request extensions
    req.extensions_mut().insert(user);

    // 6. Continue to the handler
    Ok(next.run(req).await)
}
