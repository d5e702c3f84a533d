//! In-process doubles for handler and constraint tests.
//!
//! `MemoryStore` stands in for Postgres and validates identifiers with the same
//! SQL builders `PgStore` uses. `FakeReadService` answers constraint queries by
//! running the real Read Service logic over that store, so role scoping and
//! field selection behave exactly as over HTTP.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tower::ServiceExt;

use crate::actor::{Actor, Caller, Role};
use crate::app::{router, AppState};
use crate::cli::Service;
use crate::config::AppConfig;
use crate::constraints::ConstraintChecker;
use crate::database::query_builder::{build_insert, build_select, build_update};
use crate::database::{DatabaseError, RecordStore, SessionToken};
use crate::filter::Filters;
use crate::handlers::read::{execute, ReadRequest};
use crate::read_client::{CommunicationFailure, ConstraintQuery, ReadSource};
use crate::record::{Record, ID, IS_DELETED};
use crate::tables::{DeleteMode, Table};

pub const TEST_TOKEN: &str = "Bearer test-token";

#[derive(Default)]
struct Tables {
    rows: HashMap<Table, Vec<Record>>,
    next_ids: HashMap<Table, i64>,
    tokens: Vec<SessionToken>,
    /// Row index at which the next `insert_many` fails
    fail_batch_at: Option<usize>,
}

impl Tables {
    /// The row as storage keeps it: id assigned, column defaults filled in
    fn staged(&self, table: Table, row: &Record, offset: i64) -> Record {
        let id = self.next_ids.get(&table).copied().unwrap_or(0) + 1 + offset;
        let mut stored = row.clone();
        stored.insert(ID.to_string(), id.into());
        if table.has_column(IS_DELETED) {
            stored.entry(IS_DELETED).or_insert(Value::Bool(false));
        }
        if table.is_account() {
            stored.entry("status").or_insert_with(|| "active".into());
        }
        stored.entry("created_at").or_insert_with(|| Utc::now().to_rfc3339().into());
        stored
    }

    fn commit(&mut self, table: Table, rows: Vec<Record>) -> Vec<i64> {
        let ids: Vec<i64> = rows.iter().filter_map(|r| r.get(ID).and_then(Value::as_i64)).collect();
        if let Some(last) = ids.last() {
            self.next_ids.insert(table, *last);
        }
        self.rows.entry(table).or_default().extend(rows);
        ids
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every stored row of `table`, deleted ones included, in id order
    pub fn rows(&self, table: Table) -> Vec<Record> {
        self.lock().rows.get(&table).cloned().unwrap_or_default()
    }

    /// Make the next batch insert fail on row `index`
    pub fn fail_batch_at(&self, index: usize) {
        self.lock().fail_batch_at = Some(index);
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.lock().tokens.iter().any(|t| t.token == token)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn select(&self, table: Table, columns: &[&str], filters: &Filters) -> Result<Vec<Record>, DatabaseError> {
        build_select(table, columns, filters)?;

        let inner = self.lock();
        let rows = inner.rows.get(&table).map(Vec::as_slice).unwrap_or_default();
        Ok(rows
            .iter()
            .filter(|row| filters.matches(row))
            .map(|row| {
                columns
                    .iter()
                    .map(|c| (c.to_string(), row.get(*c).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect())
    }

    async fn insert(&self, table: Table, row: &Record) -> Result<i64, DatabaseError> {
        build_insert(table, row)?;

        let mut inner = self.lock();
        let stored = inner.staged(table, row, 0);
        Ok(inner.commit(table, vec![stored])[0])
    }

    async fn insert_many(&self, table: Table, rows: &[Record]) -> Result<Vec<i64>, DatabaseError> {
        let mut inner = self.lock();
        let fail_at = inner.fail_batch_at.take();

        let mut staged = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            build_insert(table, row)?;
            if fail_at == Some(index) {
                return Err(DatabaseError::QueryError(
                    "duplicate key value violates unique constraint".to_string(),
                ));
            }
            staged.push(inner.staged(table, row, index as i64));
        }
        Ok(inner.commit(table, staged))
    }

    async fn update(&self, table: Table, id: i64, changes: &Record) -> Result<u64, DatabaseError> {
        build_update(table, changes)?;

        let mut inner = self.lock();
        let row = inner
            .rows
            .get_mut(&table)
            .and_then(|rows| rows.iter_mut().find(|r| r.get(ID).and_then(Value::as_i64) == Some(id)));
        match row {
            Some(row) => {
                for (key, value) in changes {
                    row.insert(key.clone(), value.clone());
                }
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, table: Table, ids: &[i64], mode: DeleteMode) -> Result<u64, DatabaseError> {
        let mut inner = self.lock();
        let rows = inner.rows.entry(table).or_default();
        let targeted = |row: &Record| row.get(ID).and_then(Value::as_i64).map(|id| ids.contains(&id)).unwrap_or(false);

        let mut affected = 0;
        match mode {
            DeleteMode::Hard => {
                let before = rows.len();
                rows.retain(|row| !targeted(row));
                affected = before - rows.len();
            }
            DeleteMode::SoftFlag | DeleteMode::SoftDeactivate => {
                for row in rows.iter_mut().filter(|row| targeted(row)) {
                    row.insert(IS_DELETED.to_string(), Value::Bool(true));
                    if mode == DeleteMode::SoftDeactivate {
                        row.insert("status".to_string(), "inactive".into());
                    }
                    affected += 1;
                }
            }
        }
        Ok(affected as u64)
    }

    async fn insert_token(&self, token: &SessionToken) -> Result<(), DatabaseError> {
        self.lock().tokens.push(token.clone());
        Ok(())
    }

    async fn delete_user_tokens(&self, user_id: i64, user_type: Role) -> Result<u64, DatabaseError> {
        let mut inner = self.lock();
        let before = inner.tokens.len();
        inner.tokens.retain(|t| !(t.user_id == user_id && t.user_type == user_type));
        Ok((before - inner.tokens.len()) as u64)
    }

    async fn token_active(&self, token: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        Ok(self.lock().tokens.iter().any(|t| t.token == token && t.expires_at > now))
    }

    async fn delete_token(&self, token: &str) -> Result<u64, DatabaseError> {
        let mut inner = self.lock();
        let before = inner.tokens.len();
        inner.tokens.retain(|t| t.token != token);
        Ok((before - inner.tokens.len()) as u64)
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let mut inner = self.lock();
        let before = inner.tokens.len();
        inner.tokens.retain(|t| t.expires_at >= now);
        Ok((before - inner.tokens.len()) as u64)
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Read Service double: records every query and answers it with the real
/// read logic over a `MemoryStore`, or fails with a fixed status.
pub struct FakeReadService {
    store: Arc<MemoryStore>,
    calls: Mutex<Vec<ConstraintQuery>>,
    failure: Mutex<Option<u16>>,
}

impl FakeReadService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store, calls: Mutex::new(Vec::new()), failure: Mutex::new(None) }
    }

    pub fn calls(&self) -> Vec<ConstraintQuery> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Every following query fails with `status`
    pub fn fail_with_status(&self, status: u16) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
    }
}

#[async_trait]
impl ReadSource for FakeReadService {
    async fn fetch(&self, caller: &Caller, query: &ConstraintQuery) -> Result<Vec<Record>, CommunicationFailure> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(query.clone());

        if let Some(status) = *self.failure.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(CommunicationFailure::Status { status, body: r#"{"error":"unavailable"}"#.to_string() });
        }

        let rejected = |e: crate::error::ApiError| CommunicationFailure::Status {
            status: e.status_code(),
            body: e.to_json().to_string(),
        };
        let request = ReadRequest::from_params(query.to_params()).map_err(rejected)?;
        execute(self.store.as_ref(), &caller.actor, request).await.map_err(rejected)
    }
}

/// wiremock matcher on a header's whole value. The stock `header` matcher
/// splits values on commas, which breaks JSON headers such as `X-User`.
pub struct RawHeader {
    name: &'static str,
    value: String,
}

pub fn raw_header(name: &'static str, value: impl Into<String>) -> RawHeader {
    RawHeader { name, value: value.into() }
}

impl wiremock::Match for RawHeader {
    fn matches(&self, request: &wiremock::Request) -> bool {
        request.headers.get(self.name).and_then(|v| v.to_str().ok()) == Some(self.value.as_str())
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub read: Arc<FakeReadService>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let read = Arc::new(FakeReadService::new(store.clone()));
        Self { store, read }
    }

    /// Insert a row straight into storage and return its id
    pub async fn seed(&self, table: Table, row: Value) -> i64 {
        let row = row.as_object().cloned().expect("seed rows are JSON objects");
        self.store.insert(table, &row).await.expect("seed insert")
    }

    pub fn checker<'a>(&'a self, caller: &'a Caller) -> ConstraintChecker<'a> {
        ConstraintChecker::new(self.read.as_ref(), caller)
    }

    /// Development defaults with cheap hashing and no rate limiting
    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::development();
        config.api.enable_rate_limiting = false;
        config.security.bcrypt_cost = 4;
        config.security.jwt_secret = "test-secret".to_string();
        config
    }

    pub fn state(&self) -> AppState {
        self.state_with(self.config())
    }

    pub fn state_with(&self, config: AppConfig) -> AppState {
        AppState::new(self.store.clone(), self.read.clone(), config)
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

pub fn caller(id: i64, role: Role) -> Caller {
    Caller::new(Actor::new(id, role), Some(TEST_TOKEN.to_string()))
}

/// `X-User` header value for `(id, role)`
pub fn x_user(id: i64, role: Role) -> String {
    Actor::new(id, role).to_header_value()
}

/// Every service merged, over the fixture's store and fake Read Service
pub fn app_with(fx: &Fixture) -> Router {
    router(Service::All, fx.state())
}

pub async fn get(app: &Router, uri: &str, x_user: Option<&str>) -> (StatusCode, Value) {
    let headers: Vec<(&str, &str)> = x_user.map(|v| vec![("x-user", v)]).unwrap_or_default();
    send_as(app, Method::GET, uri, &headers, Value::Null).await
}

/// Request as a caller: `X-User` plus a bearer token, when `x_user` is given
pub async fn send(app: &Router, method: Method, uri: &str, x_user: Option<&str>, body: Value) -> (StatusCode, Value) {
    let headers: Vec<(&str, &str)> = match x_user {
        Some(v) => vec![("x-user", v), ("authorization", TEST_TOKEN)],
        None => Vec::new(),
    };
    send_as(app, method, uri, &headers, body).await
}

/// Request with exactly `headers`; a non-null `body` is sent as JSON.
pub async fn send_as(
    app: &Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Value,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let body = if body.is_null() {
        Body::empty()
    } else {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(body.to_string())
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, json)
}
