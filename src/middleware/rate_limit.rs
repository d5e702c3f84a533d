use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::actor::{Actor, X_USER_HEADER};
use crate::error::ApiError;
use crate::rate_limit::{RateLimiter, Scope};

/// How a request is attributed to a rate-limit budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateKey {
    /// `X-User` identity when present. Only sound behind the gateway, which
    /// replaces that header with the verified user.
    Caller,
    /// Client address only; client-supplied headers are ignored
    ClientAddress,
}

/// Limiter bound to the service whose router it guards
#[derive(Clone)]
pub struct ScopedLimiter {
    pub limiter: RateLimiter,
    pub scope: Scope,
    pub key: RateKey,
}

/// `type:id` from a parsable `X-User`, else the client address.
pub fn rate_limit_key(request: &Request) -> String {
    let actor = request
        .headers()
        .get(X_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| serde_json::from_str::<Actor>(raw).ok());
    match actor {
        Some(actor) => actor.key(),
        None => client_address_key(request),
    }
}

/// Peer IP from `ConnectInfo`, else `anonymous`
pub fn client_address_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

pub async fn rate_limit_middleware(State(scoped): State<ScopedLimiter>, request: Request, next: Next) -> Response {
    let key = match scoped.key {
        RateKey::Caller => rate_limit_key(&request),
        RateKey::ClientAddress => client_address_key(&request),
    };
    match scoped.limiter.check_and_record(scoped.scope, &key) {
        Ok(()) => next.run(request).await,
        Err(err) => ApiError::from(err).into_response(),
    }
}
