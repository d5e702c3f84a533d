//! Read Service: `GET /read/api/get-data`.
//!
//! The single generic query endpoint every other service reads through.

use std::collections::HashMap;

use axum::extract::{Extension, Query, State};
use serde::Serialize;
use serde_json::Value;

use crate::access::authorize;
use crate::actor::{Actor, Caller, Role};
use crate::app::AppState;
use crate::database::RecordStore;
use crate::error::ApiError;
use crate::filter::{FilterError, Filters};
use crate::handlers::{log_failure, record_table};
use crate::middleware::{ApiResponse, ApiResult};
use crate::record::{field_i64, field_str, record_id, Record};
use crate::tables::Table;
use crate::types::Operation;

const PASSWORD: &str = "password";

#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    pub table: Table,
    pub filters: Filters,
    pub include_password: bool,
}

impl ReadRequest {
    /// Parse the raw query string. `tableName` and `includePassword` are
    /// reserved; every other pair is an equality filter.
    pub fn from_params(params: Vec<(String, String)>) -> Result<Self, ApiError> {
        let mut table_name = None;
        let mut include_password = false;
        let mut filters = Filters::new();

        for (key, value) in params {
            match key.as_str() {
                "tableName" => table_name = Some(value),
                "includePassword" => include_password = matches!(value.trim(), "true" | "1"),
                _ => filters.push_raw(&key, &value),
            }
        }

        let table_name = table_name
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("Missing tableName"))?;
        let table = table_name
            .parse::<Table>()
            .map_err(|_| ApiError::bad_request("Invalid table name"))?;

        Ok(Self { table, filters, include_password })
    }
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub data: Vec<Record>,
}

/// The password column is granted to admins, and to a caller reading exactly
/// their own row by id.
fn password_granted(actor: &Actor, table: Table, filters: &Filters) -> bool {
    if actor.is_admin() {
        return true;
    }
    let own_id = actor.id.to_string();
    actor.role.table() == table
        && filters
            .get("id")
            .map(|f| f.values.len() == 1 && f.values[0] == own_id)
            .unwrap_or(false)
}

/// Run a read on behalf of `actor`.
pub async fn execute(store: &dyn RecordStore, actor: &Actor, mut request: ReadRequest) -> Result<Vec<Record>, ApiError> {
    let table = request.table;
    let access = authorize(table, Operation::Read, actor.role)?;

    for filter in request.filters.iter() {
        if filter.column == PASSWORD {
            return Err(FilterError::ProtectedColumn(filter.column.clone()).into());
        }
        if !access.select_fields.contains(&filter.column.as_str()) {
            return Err(FilterError::InvalidColumn { table, column: filter.column.clone() }.into());
        }
    }

    if table == Table::Enrollment && actor.role == Role::Student {
        request.filters.set("studentId", vec![actor.id.to_string()]);
    }

    if request.include_password && !password_granted(actor, table, &request.filters) {
        return Err(ApiError::forbidden("You are not allowed to access the password field"));
    }

    let mut columns: Vec<&str> = access.select_fields.to_vec();
    if request.include_password {
        columns.push(PASSWORD);
    }

    let mut rows = store.select(table, &columns, &request.filters).await?;

    if table == Table::Course {
        attach_teacher_names(store, &mut rows).await?;
    }

    Ok(rows)
}

/// Add `teacherName` to each course row (`null` when the teacher is missing).
async fn attach_teacher_names(store: &dyn RecordStore, rows: &mut [Record]) -> Result<(), ApiError> {
    let mut teacher_ids: Vec<i64> = rows.iter().filter_map(|r| field_i64(r, "teacherId")).collect();
    teacher_ids.sort_unstable();
    teacher_ids.dedup();

    let names: HashMap<i64, String> = if teacher_ids.is_empty() {
        HashMap::new()
    } else {
        store
            .select(Table::Teacher, &["id", "name"], &Filters::new().any_of("id", teacher_ids))
            .await?
            .iter()
            .filter_map(|t| Some((record_id(t)?, field_str(t, "name")?.to_string())))
            .collect()
    };

    for row in rows.iter_mut() {
        let name = field_i64(row, "teacherId")
            .and_then(|id| names.get(&id).cloned())
            .map(Value::String)
            .unwrap_or(Value::Null);
        row.insert("teacherName".to_string(), name);
    }
    Ok(())
}

/// GET /read/api/get-data?tableName=<t>&<field>=<value>&includePassword=<bool>
#[tracing::instrument(
    name = "read",
    skip_all,
    fields(actor_id = caller.actor.id, actor_type = %caller.actor.role, operation = "read", table = tracing::field::Empty)
)]
pub async fn get_data(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<ReadResponse> {
    let request = ReadRequest::from_params(params).map_err(log_failure)?;
    record_table(request.table);

    let data = execute(state.store.as_ref(), &caller.actor, request)
        .await
        .map_err(log_failure)?;
    tracing::debug!(rows = data.len(), "read complete");
    Ok(ApiResponse::success(ReadResponse { data }))
}
