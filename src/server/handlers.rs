//! HTTP handlers for the webhook server.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::AppState;

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "success": true }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    challenge: Option<String>,
}

/// Dropbox webhook verification: echo the challenge back as plain text.
pub async fn verify_webhook(Query(params): Query<VerifyParams>) -> Response {
    match params.challenge {
        Some(challenge) => {
            info!("Received webhook verification challenge");
            (
                [(header::X_CONTENT_TYPE_OPTIONS, "nosniff")],
                challenge,
            )
                .into_response()
        }
        None => (StatusCode::BAD_REQUEST, "No challenge provided").into_response(),
    }
}

/// Folder-change notification: acknowledge immediately and wake the
/// worker. Processing outcome is never surfaced to the caller.
pub async fn handle_webhook(State(state): State<AppState>) -> Json<serde_json::Value> {
    if state.notify.try_send(()).is_err() {
        debug!("Notification wakeup already pending");
    }
    Json(json!({ "success": true }))
}
