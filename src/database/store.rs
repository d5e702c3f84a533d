use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::actor::Role;
use crate::database::manager::DatabaseError;
use crate::filter::Filters;
use crate::record::Record;
use crate::tables::{DeleteMode, Table};

/// Row of the `tokens` table: one live session per account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub user_id: i64,
    pub user_type: Role,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Storage seam behind every service. The Read Service selects through it,
/// the writer services mutate through it, and auth keeps sessions in it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, table: Table, columns: &[&str], filters: &Filters) -> Result<Vec<Record>, DatabaseError>;

    /// Insert one row, returning its id
    async fn insert(&self, table: Table, row: &Record) -> Result<i64, DatabaseError>;

    /// Insert every row or none of them, returning the ids in row order
    async fn insert_many(&self, table: Table, rows: &[Record]) -> Result<Vec<i64>, DatabaseError>;

    /// Apply `changes` to row `id`, returning the number of rows affected
    async fn update(&self, table: Table, id: i64, changes: &Record) -> Result<u64, DatabaseError>;

    async fn delete(&self, table: Table, ids: &[i64], mode: DeleteMode) -> Result<u64, DatabaseError>;

    async fn insert_token(&self, token: &SessionToken) -> Result<(), DatabaseError>;

    async fn delete_user_tokens(&self, user_id: i64, user_type: Role) -> Result<u64, DatabaseError>;

    /// True when `token` is stored and not yet expired at `now`
    async fn token_active(&self, token: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError>;

    async fn delete_token(&self, token: &str) -> Result<u64, DatabaseError>;

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;
}
