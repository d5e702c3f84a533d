// handlers/auth/mod.rs - Auth Service
//
// Public endpoints: no X-User. Login and register work from the body, logout
// and me from the bearer token.

pub mod login;
pub mod register;
pub mod session;

pub use login::login;
pub use register::register;
pub use session::{logout, me};

use serde::Serialize;

use crate::actor::Role;
use crate::database::RecordStore;
use crate::error::ApiError;
use crate::filter::Filters;
use crate::record::{field_i64, field_str, Record, IS_DELETED};
use crate::tables::Table;

/// Public view of an authenticated account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(rename = "type")]
    pub user_type: Role,
}

/// Account row found by email, with its password hash and status.
#[derive(Debug, Clone)]
pub struct Account {
    pub user: AuthUser,
    pub password_hash: String,
    pub status: String,
}

impl Account {
    fn from_row(user_type: Role, row: &Record) -> Option<Self> {
        Some(Self {
            user: AuthUser {
                id: field_i64(row, "id")?,
                name: field_str(row, "name").unwrap_or_default().to_string(),
                email: field_str(row, "email").unwrap_or_default().to_string(),
                user_type,
            },
            password_hash: field_str(row, "password").unwrap_or_default().to_string(),
            status: field_str(row, "status").unwrap_or_default().to_string(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// First live account with `email`, searching student, teacher, then admin.
pub async fn find_account(store: &dyn RecordStore, email: &str) -> Result<Option<Account>, ApiError> {
    let filters = Filters::new().eq("email", email).eq(IS_DELETED, false);
    for role in [Role::Student, Role::Teacher, Role::Admin] {
        let rows = store
            .select(role.table(), &["id", "name", "email", "password", "status"], &filters)
            .await?;
        if let Some(account) = rows.first().and_then(|row| Account::from_row(role, row)) {
            return Ok(Some(account));
        }
    }
    Ok(None)
}

/// True when any account table, deleted rows included, already uses `email`.
pub async fn email_taken(store: &dyn RecordStore, email: &str) -> Result<bool, ApiError> {
    let filters = Filters::new().eq("email", email);
    for table in Table::ACCOUNTS {
        if !store.select(table, &["id"], &filters).await?.is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}
