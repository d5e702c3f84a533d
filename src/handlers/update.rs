//! Update Service: `PUT /update-one/:id`.

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde_json::Value;

use crate::access::authorize_update;
use crate::actor::Caller;
use crate::app::AppState;
use crate::auth::password::{hash_password, verify_password};
use crate::constraints::{CandidateFields, ConstraintChecker};
use crate::error::ApiError;
use crate::handlers::{log_failure, record_table};
use crate::middleware::{ApiResponse, ApiResult, Message};
use crate::record::{field_str, Record};
use crate::tables::{Table, UpdateHook};
use crate::validation::{parse_update, validate_path_id, validate_update, UpdateRequest};

/// PUT /update-one/:id with `{type, data}`
#[tracing::instrument(
    name = "update",
    skip_all,
    fields(actor_id = caller.actor.id, actor_type = %caller.actor.role, operation = "update", table = tracing::field::Empty)
)]
pub async fn update_one(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(raw_id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Message> {
    run(&state, &caller, &raw_id, &body).await.map_err(log_failure)
}

async fn run(state: &AppState, caller: &Caller, raw_id: &str, body: &Value) -> ApiResult<Message> {
    let id = validate_path_id(raw_id)?;
    let (table, data) = parse_update(body)?;
    record_table(table);

    if matches!(table.access().update_hook, UpdateHook::Account) && caller.authorization.is_none() {
        return Err(ApiError::unauthorized("Missing authorization token"));
    }
    let access = authorize_update(table, &caller.actor, id)?;

    let UpdateRequest { mut changes, new_password, current_password } = validate_update(table, &data)?;
    let checker = ConstraintChecker::new(state.read.as_ref(), caller);

    match access.update_hook {
        UpdateHook::Account | UpdateHook::AdminAccount => {
            if let Some(new_password) = new_password {
                verify_password_change(&checker, table, id, current_password.as_deref()).await?;
                let hashed = hash_password(&new_password, state.config.security.bcrypt_cost).await?;
                changes.insert("password".to_string(), hashed.into());
            }
            let candidate = CandidateFields::from_record(&changes);
            checker.check_uniqueness(&candidate, Some((table, id))).await?.into_result()?;
        }
        UpdateHook::Course => {
            if checker.fetch_one(table, id, false).await?.is_none() {
                return Err(ApiError::not_found(format!("{} not found", table.label())));
            }
            if let Some(name) = field_str(&changes, "name") {
                checker.check_course_name_unique(name, Some(id)).await?.into_result()?;
            }
        }
        // Rejected by the gate already
        UpdateHook::Immutable => return Err(ApiError::forbidden(access.update_denied)),
    }

    if changes.is_empty() {
        return Err(ApiError::bad_request("No valid fields to update"));
    }

    let affected = state.store.update(table, id, &changes).await?;
    if affected == 0 {
        return Err(ApiError::not_found(format!("{} not found", table)));
    }

    tracing::info!(id, fields = changes.len(), "record updated");
    Ok(ApiResponse::success(Message::new(format!("{} updated successfully", table))))
}

/// An admin resetting someone else's password only needs the row to exist;
/// everyone changing their own password must prove the current one.
async fn verify_password_change(
    checker: &ConstraintChecker<'_>,
    table: Table,
    id: i64,
    current_password: Option<&str>,
) -> Result<(), ApiError> {
    let not_found = || ApiError::not_found(format!("{} not found", table.label()));
    let actor = checker.actor();

    if actor.is_admin() && !actor.is_self(table, id) {
        return match checker.fetch_one(table, id, false).await? {
            Some(_) => Ok(()),
            None => Err(not_found()),
        };
    }

    let current = current_password.ok_or_else(|| ApiError::forbidden("Current password required"))?;
    let row: Record = checker.fetch_one(table, id, true).await?.ok_or_else(not_found)?;
    let hash = field_str(&row, "password").unwrap_or_default();

    if verify_password(current, hash).await? {
        Ok(())
    } else {
        Err(ApiError::forbidden("Current password is incorrect"))
    }
}
