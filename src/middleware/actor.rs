use axum::{extract::Request, middleware::Next, response::IntoResponse, response::Response};

use crate::actor::Caller;

/// Resolve the caller from `X-User` (plus the raw `Authorization` value) and
/// make it available to handlers as an `Extension<Caller>`.
pub async fn x_user_middleware(mut request: Request, next: Next) -> Response {
    match Caller::from_headers(request.headers()) {
        Ok(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(err) => {
            tracing::debug!(path = %request.uri().path(), error = %err, "rejected request without a valid caller");
            err.into_response()
        }
    }
}
