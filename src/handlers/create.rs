//! Create Service: `POST /insert`.

use std::collections::{BTreeMap, HashSet};

use axum::extract::{Extension, State};
use axum::Json;
use serde_json::Value;

use crate::access::authorize;
use crate::actor::{Caller, Role};
use crate::app::AppState;
use crate::auth::password::hash_password;
use crate::constraints::uniqueness::DUPLICATE_ACCOUNT;
use crate::constraints::{BatchOutcome, CandidateFields, ConstraintChecker, EnrollmentRequest, Violation};
use crate::error::ApiError;
use crate::handlers::{log_failure, record_table};
use crate::middleware::{ApiResponse, ApiResult, Message};
use crate::record::{field_i64, field_str, Record};
use crate::tables::InsertHook;
use crate::types::Operation;
use crate::validation::{parse_insert, validate_insert, ValidationErrors};

const FAILED_TO_INSERT: &str = "Failed to insert record(s)";

/// POST /insert with `{payload: {table, data}}` or `{table, data}`
#[tracing::instrument(
    name = "create",
    skip_all,
    fields(actor_id = caller.actor.id, actor_type = %caller.actor.role, operation = "create", table = tracing::field::Empty)
)]
pub async fn insert(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<Value>,
) -> ApiResult<Message> {
    run(&state, &caller, &body).await.map_err(log_failure)
}

async fn run(state: &AppState, caller: &Caller, body: &Value) -> ApiResult<Message> {
    let (table, data) = parse_insert(body)?;
    record_table(table);

    let access = authorize(table, Operation::Create, caller.actor.role)?;
    let rows = validate_insert(table, data)?;

    let checker = ConstraintChecker::new(state.read.as_ref(), caller);
    let mut rows = match access.insert_hook {
        InsertHook::AccountUniqueness => {
            check_accounts(&checker, &rows).await?;
            rows
        }
        InsertHook::CourseNameUniqueness => {
            check_course_names(&checker, &rows).await?;
            rows
        }
        InsertHook::EnrollmentBatch => enrollment_rows(&checker, caller, &rows).await?,
    };

    if rows.is_empty() {
        return Err(ApiError::bad_request(FAILED_TO_INSERT));
    }

    for row in rows.iter_mut() {
        if let Some(password) = field_str(row, "password").map(str::to_string) {
            let hashed = hash_password(&password, state.config.security.bcrypt_cost).await?;
            row.insert("password".to_string(), hashed.into());
        }
    }

    state.store.insert_many(table, &rows).await?;

    tracing::info!(inserted = rows.len(), "records inserted");
    let message = if rows.len() > 1 {
        format!("{} {} records inserted successfully", rows.len(), table)
    } else {
        format!("{} record inserted successfully", table)
    };
    Ok(ApiResponse::created(Message::new(message)))
}

/// Each new account must be unique against storage and against the rest of
/// the batch.
async fn check_accounts(checker: &ConstraintChecker<'_>, rows: &[Record]) -> Result<(), ApiError> {
    let mut seen: HashSet<(&'static str, String)> = HashSet::new();

    for row in rows {
        let candidate = CandidateFields::from_record(row);
        let fields = [("email", &candidate.email), ("cnic", &candidate.cnic), ("phone", &candidate.phone)];
        for (name, value) in fields {
            if let Some(value) = value {
                if !seen.insert((name, value.clone())) {
                    return Err(Violation::uniqueness(DUPLICATE_ACCOUNT).into());
                }
            }
        }

        checker.check_uniqueness(&candidate, None).await?.into_result()?;
    }
    Ok(())
}

async fn check_course_names(checker: &ConstraintChecker<'_>, rows: &[Record]) -> Result<(), ApiError> {
    let mut seen = HashSet::new();
    for row in rows {
        let Some(name) = field_str(row, "name") else {
            continue;
        };
        if !seen.insert(name) {
            return Err(Violation::uniqueness(format!("A course with the name '{}' already exists", name)).into());
        }
        checker.check_course_name_unique(name, None).await?.into_result()?;
    }
    Ok(())
}

/// Resolve the enrollment batch into the rows that will actually be inserted.
async fn enrollment_rows(
    checker: &ConstraintChecker<'_>,
    caller: &Caller,
    rows: &[Record],
) -> Result<Vec<Record>, ApiError> {
    let mut requests = Vec::with_capacity(rows.len());
    let mut missing = ValidationErrors::new();

    for (index, row) in rows.iter().enumerate() {
        let student_id = field_i64(row, "studentId");
        if student_id.is_none() && caller.actor.role != Role::Student {
            let field = if rows.len() > 1 { format!("[{}].studentId", index) } else { "studentId".to_string() };
            missing.add(field, "Student ID is required");
        }
        // Validation guarantees courseId on every row
        if let Some(course_id) = field_i64(row, "courseId") {
            requests.push(EnrollmentRequest { student_id, course_id });
        }
    }
    if !missing.is_empty() {
        return Err(missing.into());
    }

    let BatchOutcome { accepted, skipped } = checker.validate_enrollment_batch(&requests).await?.into_result()?;

    for (enrollment, reason) in &skipped {
        tracing::info!(
            student_id = enrollment.student_id,
            course_id = enrollment.course_id,
            reason = %reason.violation(),
            "enrollment skipped"
        );
    }

    if accepted.is_empty() {
        let details: BTreeMap<String, String> = skipped
            .iter()
            .map(|(enrollment, reason)| (format!("courseId {}", enrollment.course_id), reason.violation().message))
            .collect();
        return Err(ApiError::validation_error(FAILED_TO_INSERT, Some(details)));
    }

    Ok(accepted
        .into_iter()
        .map(|enrollment| {
            let mut row = Record::new();
            row.insert("studentId".to_string(), enrollment.student_id.into());
            row.insert("courseId".to_string(), enrollment.course_id.into());
            row
        })
        .collect())
}
