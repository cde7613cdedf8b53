//! REST API routes configuration

use crate::api::handlers::{self, ApiError, ApiState};
use crate::api::websocket::ws_handler;
use axum::{
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Unknown routes get a JSON 404
async fn fallback_handler(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError {
            error: format!("Not Found: {}", uri.path()),
        }),
    )
}

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // WebSocket event feed
        .route("/ws", get(ws_handler))
        // Wallet
        .route("/api/wallet", get(handlers::get_wallet_info))
        .route(
            "/api/wallet/owners/{address}",
            get(handlers::get_owner_status),
        )
        .route("/api/wallet/deposit", post(handlers::deposit))
        // Operations
        .route(
            "/api/operations",
            get(handlers::list_operations).post(handlers::submit_operation),
        )
        .route("/api/operations/{id}", get(handlers::get_operation))
        .route(
            "/api/operations/{id}/confirm",
            post(handlers::confirm_operation),
        )
        .route(
            "/api/operations/{id}/revoke",
            post(handlers::revoke_confirmation),
        )
        .route(
            "/api/operations/{id}/confirmations/{owner}",
            get(handlers::get_confirmation),
        )
        // Events
        .route("/api/events", get(handlers::get_events))
        .fallback(fallback_handler)
        // Add state and middleware
        .with_state(state)
        .layer(cors)
}
