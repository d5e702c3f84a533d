// POST /register

use axum::extract::State;
use axum::Json;
use serde_json::Value;

use crate::app::AppState;
use crate::auth::password::hash_password;
use crate::error::ApiError;
use crate::handlers::auth::email_taken;
use crate::handlers::log_failure;
use crate::middleware::{ApiResponse, ApiResult, Message};
use crate::record::Record;
use crate::validation::{validate_register, RegisterRequest};

#[tracing::instrument(name = "register", skip_all, fields(operation = "register", table = tracing::field::Empty))]
pub async fn register(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Message> {
    run(&state, &body).await.map_err(log_failure)
}

async fn run(state: &AppState, body: &Value) -> ApiResult<Message> {
    let RegisterRequest { user_type, name, email, password } = validate_register(body)?;
    crate::handlers::record_table(user_type.table());

    if email_taken(state.store.as_ref(), &email).await? {
        return Err(ApiError::bad_request("Email already exists"));
    }

    let hashed = hash_password(&password, state.config.security.bcrypt_cost).await?;

    let mut row = Record::new();
    row.insert("name".to_string(), name.into());
    row.insert("email".to_string(), email.into());
    row.insert("password".to_string(), hashed.into());
    row.insert("status".to_string(), "active".into());

    let id = state.store.insert(user_type.table(), &row).await?;
    tracing::info!(id, user_type = %user_type, "account registered");
    Ok(ApiResponse::created(Message::new("User registered successfully")))
}

#[cfg(test)]
mod tests {
    use crate::auth::password::verify_password;
    use crate::tables::Table;
    use crate::testing::{app_with, send_as, Fixture};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn registers_an_active_account() {
        let fx = Fixture::new();
        let app = app_with(&fx);

        let (status, body) = send_as(
            &app,
            Method::POST,
            "/register",
            &[],
            json!({"type": "teacher", "name": "Sara", "email": "sara@school.pk", "password": "secret1"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"message": "User registered successfully"}));

        let row = fx.store.rows(Table::Teacher).remove(0);
        assert_eq!(row["status"], "active");
        assert!(verify_password("secret1", row["password"].as_str().unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn email_must_be_unused_in_every_account_table() {
        let fx = Fixture::new();
        fx.seed(Table::Admin, json!({"name": "Root", "email": "root@school.pk"})).await;
        let app = app_with(&fx);

        let (status, body) = send_as(
            &app,
            Method::POST,
            "/register",
            &[],
            json!({"type": "student", "name": "Ali", "email": "root@school.pk", "password": "secret1"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Email already exists"}));
        assert!(fx.store.rows(Table::Student).is_empty());
    }

    #[tokio::test]
    async fn type_must_be_an_account_table() {
        let fx = Fixture::new();
        let app = app_with(&fx);

        let (status, body) = send_as(
            &app,
            Method::POST,
            "/register",
            &[],
            json!({"type": "course", "name": "Sara", "email": "sara@school.pk", "password": "secret1"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"]["type"], "Invalid user type");
    }
}
