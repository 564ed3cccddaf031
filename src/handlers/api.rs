use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// Health check handler
/// Returns a simple JSON response indicating the server is running
pub async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "OK"
    })))
}

/// Mint a short-lived avatar access token for the browser SDK.
///
/// Keeps the provider API key server-side; the client only ever sees the
/// session-scoped token.
pub async fn avatar_token(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let avatar_api = state
        .avatar_api
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("HEYGEN_API_KEY is not configured".into()))?;

    let token = avatar_api
        .create_token()
        .await
        .map_err(|e| AppError::InternalServerError(format!("Token fetch failed: {e}")))?;

    Ok(Json(json!({ "token": token })))
}
