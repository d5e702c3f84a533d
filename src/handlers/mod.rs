// handlers/mod.rs - one module per service
//
// Read, create, update and delete sit behind the X-User middleware and receive
// an `Extension<Caller>`. Auth endpoints are public and work from the bearer
// token instead.

pub mod auth;
pub mod create;
pub mod delete;
pub mod health;
pub mod read;
pub mod update;

use crate::error::ApiError;

/// Log a failed request before it is turned into a response. Actor, table and
/// operation come from the handler's span.
pub(crate) fn log_failure(err: ApiError) -> ApiError {
    let status = err.status_code();
    if status >= 500 {
        tracing::error!(status, code = err.error_code(), error = %err, "request failed");
    } else {
        tracing::warn!(status, code = err.error_code(), error = %err, "request rejected");
    }
    err
}

/// Attach the target table to the current request span
pub(crate) fn record_table(table: crate::tables::Table) {
    tracing::Span::current().record("table", table.as_str());
}
