//! Router configuration for the webhook server.

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/webhook",
            get(handlers::verify_webhook).post(handlers::handle_webhook),
        )
        .with_state(state)
}
