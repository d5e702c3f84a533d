// POST /login

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::app::AppState;
use crate::auth::password::verify_password;
use crate::auth::{generate_jwt, Claims};
use crate::database::SessionToken;
use crate::error::ApiError;
use crate::handlers::auth::{find_account, AuthUser};
use crate::handlers::log_failure;
use crate::middleware::{ApiResponse, ApiResult};
use crate::validation::validate_login;

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub token: String,
    pub user: AuthUser,
}

#[tracing::instrument(name = "login", skip_all, fields(operation = "login", email = tracing::field::Empty))]
pub async fn login(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<LoginResponse> {
    run(&state, &body).await.map_err(log_failure)
}

async fn run(state: &AppState, body: &Value) -> ApiResult<LoginResponse> {
    let request = validate_login(body)?;
    let email = request.email.as_str();
    tracing::Span::current().record("email", email);

    let throttle = &state.login_throttle;
    if throttle.is_locked(email) {
        return Err(ApiError::too_many_requests(format!(
            "Too many failed attempts. Try again in {} minutes.",
            throttle.lock_minutes()
        )));
    }

    let Some(account) = find_account(state.store.as_ref(), email).await? else {
        throttle.record_failure(email);
        return Err(ApiError::unauthorized("Email not registered."));
    };

    if !account.is_active() {
        return Err(ApiError::forbidden("Inactive users cannot login."));
    }

    if !verify_password(&request.password, &account.password_hash).await? {
        throttle.record_failure(email);
        return Err(ApiError::unauthorized("Invalid password."));
    }
    throttle.reset(email);

    let user = account.user;
    let security = &state.config.security;

    // One live session per account
    state.store.delete_user_tokens(user.id, user.user_type).await?;

    let claims = Claims::new(user.id, user.name.clone(), user.email.clone(), user.user_type, security.jwt_expiry_hours);
    let token = generate_jwt(&claims, &security.jwt_secret)?;
    let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);

    state
        .store
        .insert_token(&SessionToken { user_id: user.id, user_type: user.user_type, token: token.clone(), expires_at })
        .await?;

    tracing::info!(user_id = user.id, user_type = %user.user_type, "login succeeded");
    Ok(ApiResponse::success(LoginResponse { message: "Login successful", token, user }))
}
