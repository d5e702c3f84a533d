use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

use super::{GatewayState, Upstream};
use crate::actor::{Actor, X_USER_HEADER};
use crate::auth::bearer_token;
use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("auth service unreachable: {0}")]
    Transport(String),

    #[error("auth service refused the token ({0})")]
    Refused(u16),

    #[error("malformed /me response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    user: Actor,
}

/// Ask the Auth Service who owns `token`.
pub async fn verify(gw: &GatewayState, token: &str) -> Result<Actor, SessionError> {
    let url = format!("{}/me", gw.base_url(Upstream::Auth).trim_end_matches('/'));
    let response = gw
        .client()
        .get(url)
        .header(AUTHORIZATION, format!("Bearer {}", token))
        .send()
        .await
        .map_err(|e| SessionError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SessionError::Refused(status.as_u16()));
    }
    let body: MeResponse = response.json().await.map_err(|e| SessionError::Malformed(e.to_string()))?;
    Ok(body.user)
}

/// Rejects requests without a live session and stamps the verified
/// identity into `X-User`, overwriting the client's value.
pub async fn require_session(State(gw): State<GatewayState>, mut request: Request, next: Next) -> Response {
    let Some(token) = bearer_token(request.headers()).map(str::to_string) else {
        return ApiError::unauthorized("Unauthorized: No token provided.").into_response();
    };

    let actor = match verify(&gw, &token).await {
        Ok(actor) => actor,
        Err(err) => {
            tracing::info!(error = %err, "session rejected");
            return ApiError::unauthorized("Unauthorized: Please log in.").into_response();
        }
    };

    // Downstream services read only `id` and `type`, both ASCII
    let verified = Actor::new(actor.id, actor.role).to_header_value();
    match HeaderValue::from_str(&verified) {
        Ok(value) => {
            request.headers_mut().insert(X_USER_HEADER, value);
            next.run(request).await
        }
        Err(_) => ApiError::internal_server_error("Internal server error").into_response(),
    }
}
