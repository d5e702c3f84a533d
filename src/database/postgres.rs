use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::actor::Role;
use crate::database::manager::DatabaseError;
use crate::database::query_builder::{build_delete, build_insert, build_select, build_update};
use crate::database::store::{RecordStore, SessionToken};
use crate::filter::Filters;
use crate::record::Record;
use crate::tables::{DeleteMode, Table};

/// Postgres-backed record store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn select(&self, table: Table, columns: &[&str], filters: &Filters) -> Result<Vec<Record>, DatabaseError> {
        let sql = build_select(table, columns, filters)?;
        let mut q = sqlx::query_scalar::<_, Value>(&sql.query);
        for p in sql.params.iter() {
            q = q.bind(p.as_slice());
        }
        let rows = q.fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| match row {
                Value::Object(map) => Ok(map),
                other => Err(DatabaseError::QueryError(format!("expected JSON object row, got {}", other))),
            })
            .collect()
    }

    async fn insert(&self, table: Table, row: &Record) -> Result<i64, DatabaseError> {
        let sql = build_insert(table, row)?;
        let id: i64 = sqlx::query_scalar(&sql)
            .bind(Value::Object(row.clone()))
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn insert_many(&self, table: Table, rows: &[Record]) -> Result<Vec<i64>, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let sql = build_insert(table, row)?;
            let id: i64 = sqlx::query_scalar(&sql)
                .bind(Value::Object(row.clone()))
                .fetch_one(&mut *tx)
                .await?;
            ids.push(id);
        }
        // Dropping `tx` on any error above rolls the batch back
        tx.commit().await?;
        Ok(ids)
    }

    async fn update(&self, table: Table, id: i64, changes: &Record) -> Result<u64, DatabaseError> {
        let sql = build_update(table, changes)?;
        let result = sqlx::query(&sql)
            .bind(Value::Object(changes.clone()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, table: Table, ids: &[i64], mode: DeleteMode) -> Result<u64, DatabaseError> {
        let result = sqlx::query(&build_delete(table, mode))
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_token(&self, token: &SessionToken) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO tokens (user_id, user_type, token, expires_at) VALUES ($1, $2, $3, $4)")
            .bind(token.user_id)
            .bind(token.user_type.as_str())
            .bind(&token.token)
            .bind(token.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_user_tokens(&self, user_id: i64, user_type: Role) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM tokens WHERE user_id = $1 AND user_type = $2")
            .bind(user_id)
            .bind(user_type.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn token_active(&self, token: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let active: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM tokens WHERE token = $1 AND (expires_at IS NULL OR expires_at > $2))",
        )
        .bind(token)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(active)
    }

    async fn delete_token(&self, token: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
