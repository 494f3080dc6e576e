//! services/api/src/bin/api.rs

use api_lib::{
    config::Config,
    error::ApiError,
    maintenance::spawn_message_purge,
    storage::{seed_bootstrap_admin, select_storage},
    web::{
        auth::{login_handler, logout_handler, signup_handler},
        middleware::require_auth,
        rest::{
            approve_account_request_handler, create_flashcard_handler, create_pack_handler,
            create_user_handler, delete_flashcard_handler, delete_user_handler,
            get_conversation_handler, health_handler, list_account_requests_handler,
            list_deleted_packs_handler, list_flashcards_handler, list_packs_handler,
            list_recipients_handler, list_users_handler, mark_conversation_read_handler,
            permanently_delete_pack_handler, record_pack_view_handler,
            reject_account_request_handler, restore_pack_handler, send_message_handler,
            soft_delete_pack_handler, unread_count_handler, update_flashcard_handler,
            update_pack_handler, update_user_handler, ApiDoc,
        },
        state::AppState,
        ws_handler,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Select a Storage Backend & Seed the Bootstrap Admin ---
    let store = select_storage(&config).await;
    seed_bootstrap_admin(store.as_ref(), &config.bootstrap_admin_password).await?;

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(store, config.clone()));

    // --- 4. Start the Background Retention Purge ---
    spawn_message_purge(app_state.clone());

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .allowed_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("Invalid ALLOWED_ORIGIN: {}", e)))?,
        )
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/users", get(list_users_handler).post(create_user_handler))
        .route(
            "/users/{id}",
            put(update_user_handler).delete(delete_user_handler),
        )
        .route("/account-requests", get(list_account_requests_handler))
        .route(
            "/account-requests/{id}/approve",
            post(approve_account_request_handler),
        )
        .route(
            "/account-requests/{id}/reject",
            post(reject_account_request_handler),
        )
        .route("/packs", get(list_packs_handler).post(create_pack_handler))
        .route("/packs/deleted", get(list_deleted_packs_handler))
        .route(
            "/packs/{id}",
            put(update_pack_handler).delete(soft_delete_pack_handler),
        )
        .route("/packs/{id}/restore", post(restore_pack_handler))
        .route(
            "/packs/{id}/permanent",
            delete(permanently_delete_pack_handler),
        )
        .route("/packs/{id}/view", post(record_pack_view_handler))
        .route("/packs/{id}/flashcards", get(list_flashcards_handler))
        .route("/flashcards", post(create_flashcard_handler))
        .route(
            "/flashcards/{id}",
            put(update_flashcard_handler).delete(delete_flashcard_handler),
        )
        .route("/messages", post(send_message_handler))
        .route("/messages/recipients", get(list_recipients_handler))
        .route("/messages/unread-count", get(unread_count_handler))
        .route(
            "/messages/{other_user_id}",
            get(get_conversation_handler),
        )
        .route(
            "/messages/{other_user_id}/read",
            post(mark_conversation_read_handler),
        )
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
