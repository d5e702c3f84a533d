// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::access::AccessDenied;
use crate::auth::password::PasswordError;
use crate::auth::JwtError;
use crate::constraints::{Violation, ViolationKind};
use crate::database::DatabaseError;
use crate::filter::FilterError;
use crate::rate_limit::RateLimitError;
use crate::read_client::CommunicationFailure;
use crate::validation::ValidationErrors;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<BTreeMap<String, String>>,
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 429 Too Many Requests
    TooManyRequests(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 502 Bad Gateway (Read Service issues)
    BadGateway(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// HTTP status for the response
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError { .. } => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::TooManyRequests(_) => 429,
            ApiError::InternalServerError(_) => 500,
            ApiError::BadGateway(_) => 502,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Client-safe message
    pub fn message(&self) -> &str {
        match self {
            ApiError::ValidationError { message, .. } => message,
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::TooManyRequests(msg)
            | ApiError::InternalServerError(msg)
            | ApiError::BadGateway(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Response body: `{"error": message}`, plus `details` for field errors
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field_errors: Some(field_errors) } => {
                json!({
                    "error": message,
                    "details": field_errors
                })
            }
            _ => json!({ "error": self.message() }),
        }
    }

    /// Get error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<BTreeMap<String, String>>) -> Self {
        ApiError::ValidationError { message: message.into(), field_errors }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        ApiError::TooManyRequests(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::EmptyChanges(_) => ApiError::bad_request("No valid fields to update"),
            DatabaseError::InvalidColumn { column, .. } => ApiError::bad_request(format!("Invalid field '{}'", column)),
            DatabaseError::Filter(err) => err.into(),
            DatabaseError::Sqlx(sqlx::Error::PoolTimedOut) => {
                tracing::error!("database pool timed out");
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            other => {
                // Never expose SQL errors to clients
                tracing::error!(error = %other, "database error");
                ApiError::internal_server_error("Internal server error")
            }
        }
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<CommunicationFailure> for ApiError {
    fn from(err: CommunicationFailure) -> Self {
        tracing::error!(error = %err, "read service communication failure");
        ApiError::bad_gateway("Failed to communicate with Read Service")
    }
}

impl From<Violation> for ApiError {
    fn from(violation: Violation) -> Self {
        match violation.kind {
            ViolationKind::Uniqueness => ApiError::Conflict(violation.message),
            ViolationKind::ReferentialIntegrity | ViolationKind::CapacityExceeded | ViolationKind::Forbidden => {
                ApiError::Forbidden(violation.message)
            }
        }
    }
}

impl From<AccessDenied> for ApiError {
    fn from(denied: AccessDenied) -> Self {
        ApiError::forbidden(denied.message)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let ValidationErrors { message, fields } = errors;
        let field_errors = if fields.is_empty() { None } else { Some(fields) };
        ApiError::validation_error(message, field_errors)
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Invalid(_) => ApiError::unauthorized("Invalid or expired token"),
            other => {
                tracing::error!(error = %other, "failed to sign token");
                ApiError::internal_server_error("Internal server error")
            }
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        tracing::error!(error = %err, "password hashing failed");
        ApiError::internal_server_error("Internal server error")
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        tracing::warn!(error = %err, "rate limit exceeded");
        ApiError::too_many_requests("Too many requests, please try again later.")
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violations_map_to_conflict_or_forbidden() {
        assert_eq!(ApiError::from(Violation::uniqueness("dup")).status_code(), 409);
        assert_eq!(ApiError::from(Violation::referential("dangling")).status_code(), 403);
        assert_eq!(ApiError::from(Violation::capacity("full")).status_code(), 403);
        assert_eq!(ApiError::from(Violation::forbidden("nope")).status_code(), 403);
    }

    #[test]
    fn communication_failure_is_bad_gateway() {
        let err = ApiError::from(CommunicationFailure::Transport("refused".into()));
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.to_json(), json!({"error": "Failed to communicate with Read Service"}));
    }

    #[test]
    fn storage_errors_hide_details() {
        let err = ApiError::from(DatabaseError::QueryError("syntax error at or near".into()));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.message(), "Internal server error");
    }

    #[test]
    fn validation_errors_carry_details() {
        let mut fields = BTreeMap::new();
        fields.insert("email".to_string(), "Invalid email".to_string());
        let err = ApiError::validation_error("Validation failed", Some(fields));
        assert_eq!(
            err.to_json(),
            json!({"error": "Validation failed", "details": {"email": "Invalid email"}})
        );
    }
}
