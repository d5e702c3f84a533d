// POST /logout, GET /me

use axum::extract::State;
use axum::http::HeaderMap;
use chrono::Utc;
use serde::Serialize;

use crate::app::AppState;
use crate::auth::{bearer_token, decode_jwt};
use crate::error::ApiError;
use crate::handlers::auth::AuthUser;
use crate::handlers::log_failure;
use crate::middleware::{ApiResponse, ApiResult, Message};

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: AuthUser,
}

#[tracing::instrument(name = "logout", skip_all, fields(operation = "logout"))]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Message> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("No token provided"))
        .map_err(log_failure)?;

    let removed = state.store.delete_token(token).await.map_err(|e| log_failure(e.into()))?;
    tracing::info!(removed, "session closed");
    Ok(ApiResponse::success(Message::new("Logged out successfully")))
}

#[tracing::instrument(name = "me", skip_all, fields(operation = "me"))]
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<MeResponse> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))
        .map_err(log_failure)?;

    let claims = decode_jwt(token, &state.config.security.jwt_secret).map_err(|e| log_failure(e.into()))?;

    let active = state
        .store
        .token_active(token, Utc::now())
        .await
        .map_err(|e| log_failure(e.into()))?;
    if !active {
        return Err(log_failure(ApiError::unauthorized("Session expired or invalid")));
    }

    Ok(ApiResponse::success(MeResponse {
        user: AuthUser { id: claims.id, name: claims.name, email: claims.email, user_type: claims.user_type },
    }))
}
