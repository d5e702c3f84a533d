//! Delete Service: `DELETE /delete` and `DELETE /delete/:id`.

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde_json::Value;

use crate::access::authorize;
use crate::actor::Caller;
use crate::app::AppState;
use crate::constraints::ConstraintChecker;
use crate::error::ApiError;
use crate::handlers::{log_failure, record_table};
use crate::middleware::{ApiResponse, ApiResult, Message};
use crate::types::Operation;
use crate::validation::{validate_delete, DeleteRequest};

#[tracing::instrument(
    name = "delete",
    skip_all,
    fields(actor_id = caller.actor.id, actor_type = %caller.actor.role, operation = "delete", table = tracing::field::Empty)
)]
pub async fn delete_many(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Option<Json<Value>>,
) -> ApiResult<Message> {
    let body = body.map(|Json(v)| v).unwrap_or(Value::Null);
    run(&state, &caller, &body, None).await.map_err(log_failure)
}

#[tracing::instrument(
    name = "delete",
    skip_all,
    fields(actor_id = caller.actor.id, actor_type = %caller.actor.role, operation = "delete", table = tracing::field::Empty)
)]
pub async fn delete_one(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(raw_id): Path<String>,
    body: Option<Json<Value>>,
) -> ApiResult<Message> {
    let body = body.map(|Json(v)| v).unwrap_or(Value::Null);
    run(&state, &caller, &body, Some(&raw_id)).await.map_err(log_failure)
}

async fn run(state: &AppState, caller: &Caller, body: &Value, path_id: Option<&str>) -> ApiResult<Message> {
    let DeleteRequest { table, ids } = validate_delete(body, path_id)?;
    record_table(table);

    let access = authorize(table, Operation::Delete, caller.actor.role)?;

    ConstraintChecker::new(state.read.as_ref(), caller)
        .check_deletable(table, &ids)
        .await?
        .into_result()?;

    let affected = state.store.delete(table, &ids, access.delete_mode).await?;
    if affected == 0 {
        return Err(ApiError::not_found(format!("No {} records found", table)));
    }

    tracing::info!(?ids, affected, mode = ?access.delete_mode, "records deleted");
    Ok(ApiResponse::success(Message::new(format!("{}(s) deleted successfully", table))))
}

#[cfg(test)]
mod tests {
    use crate::actor::Role;
    use crate::tables::Table;
    use crate::testing::{app_with, send, x_user, Fixture};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn teacher_with_live_course_is_kept() {
        let fx = Fixture::new();
        let teacher = fx.seed(Table::Teacher, json!({"name": "Sara", "email": "sara@school.pk"})).await;
        fx.seed(Table::Course, json!({"name": "Algorithms", "teacherId": teacher, "credit_hours": 3})).await;
        let app = app_with(&fx);

        let (status, body) = send(
            &app,
            Method::DELETE,
            &format!("/delete/{}", teacher),
            Some(&x_user(1, Role::Admin)),
            json!({"type": "teacher"}),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({"error": "Cannot delete teacher with active courses"}));
        assert_eq!(fx.store.rows(Table::Teacher)[0]["isDeleted"], false);
    }

    #[tokio::test]
    async fn teacher_whose_courses_are_deleted_is_soft_deleted() {
        let fx = Fixture::new();
        let teacher = fx.seed(Table::Teacher, json!({"name": "Sara", "email": "sara@school.pk"})).await;
        fx.seed(Table::Course, json!({"name": "Algorithms", "teacherId": teacher, "credit_hours": 3, "isDeleted": true}))
            .await;
        let app = app_with(&fx);

        let (status, body) = send(
            &app,
            Method::DELETE,
            "/delete",
            Some(&x_user(1, Role::Admin)),
            json!({"type": "teacher", "ids": [teacher]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "teacher(s) deleted successfully"}));

        let row = fx.store.rows(Table::Teacher).remove(0);
        assert_eq!(row["isDeleted"], true);
        assert_eq!(row["status"], "inactive");
    }

    #[tokio::test]
    async fn enrollments_are_hard_deleted_by_their_student() {
        let fx = Fixture::new();
        let own = fx.seed(Table::Enrollment, json!({"studentId": 4, "courseId": 1})).await;
        let other = fx.seed(Table::Enrollment, json!({"studentId": 5, "courseId": 1})).await;
        let app = app_with(&fx);
        let student = x_user(4, Role::Student);

        let (status, body) = send(
            &app,
            Method::DELETE,
            "/delete",
            Some(&student),
            json!({"type": "enrollment", "ids": [own, other]}),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Students can only delete their own enrollments");

        let (status, _) =
            send(&app, Method::DELETE, &format!("/delete/{}", own), Some(&student), json!({"type": "enrollment"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fx.store.rows(Table::Enrollment).len(), 1);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let fx = Fixture::new();
        let app = app_with(&fx);

        let (status, body) =
            send(&app, Method::DELETE, "/delete/12", Some(&x_user(1, Role::Admin)), json!({"type": "course"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "No course records found"}));
    }

    #[tokio::test]
    async fn students_cannot_delete_accounts() {
        let fx = Fixture::new();
        let app = app_with(&fx);

        let (status, body) =
            send(&app, Method::DELETE, "/delete/2", Some(&x_user(2, Role::Student)), json!({"type": "student"})).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({"error": "Only admin can delete students"}));
        assert!(fx.read.calls().is_empty());
    }

    #[tokio::test]
    async fn ids_are_required() {
        let fx = Fixture::new();
        let app = app_with(&fx);

        let (status, body) =
            send(&app, Method::DELETE, "/delete", Some(&x_user(1, Role::Admin)), json!({"type": "course"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"]["ids"], "At least one ID is required");
    }

    #[tokio::test]
    async fn read_service_failure_deletes_nothing() {
        let fx = Fixture::new();
        let student = fx.seed(Table::Student, json!({"name": "Ali", "email": "ali@school.pk"})).await;
        fx.read.fail_with_status(500);
        let app = app_with(&fx);

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/delete/{}", student),
            Some(&x_user(1, Role::Admin)),
            json!({"type": "student"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(fx.store.rows(Table::Student)[0]["isDeleted"], false);
    }
}
