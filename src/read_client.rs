//! Client side of the Read Service query surface.
//!
//! The write-path services never read storage directly: every snapshot used
//! by a constraint check comes through a `ReadSource`. Production uses
//! `HttpReadClient`; tests substitute an in-process fake.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::actor::{Caller, X_USER_HEADER};
use crate::record::Record;
use crate::tables::Table;

/// A query sent to the Read Service: table plus equality filters.
/// A filter value containing commas means "any of".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintQuery {
    pub table: Table,
    pub filters: Vec<(String, String)>,
    pub include_password: bool,
}

impl ConstraintQuery {
    pub fn table(table: Table) -> Self {
        Self { table, filters: Vec::new(), include_password: false }
    }

    pub fn filter(mut self, field: &str, value: impl ToString) -> Self {
        self.filters.push((field.to_string(), value.to_string()));
        self
    }

    /// `field IN (ids)`, sent as a comma-joined list
    pub fn any_of(self, field: &str, ids: &[i64]) -> Self {
        let joined = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
        self.filter(field, joined)
    }

    pub fn with_password(mut self) -> Self {
        self.include_password = true;
        self
    }

    /// Query-string pairs in the order the Read Service expects them
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("tableName".to_string(), self.table.to_string())];
        params.extend(self.filters.iter().cloned());
        if self.include_password {
            params.push(("includePassword".to_string(), "true".to_string()));
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommunicationFailure {
    #[error("read service unreachable: {0}")]
    Transport(String),

    #[error("read service responded {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed read service response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ReadSource: Send + Sync {
    async fn fetch(&self, caller: &Caller, query: &ConstraintQuery) -> Result<Vec<Record>, CommunicationFailure>;
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    data: Vec<Record>,
}

/// Read Service client over HTTP with a fixed per-call timeout. No retries.
#[derive(Clone)]
pub struct HttpReadClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpReadClient {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ReadSource for HttpReadClient {
    async fn fetch(&self, caller: &Caller, query: &ConstraintQuery) -> Result<Vec<Record>, CommunicationFailure> {
        let mut request = self
            .client
            .get(self.endpoint.clone())
            .query(&query.to_params())
            .header(X_USER_HEADER, caller.actor.to_header_value());

        if let Some(authorization) = &caller.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CommunicationFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CommunicationFailure::Status { status: status.as_u16(), body });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CommunicationFailure::Transport(e.to_string()))?;

        let parsed: ReadResponse =
            serde_json::from_slice(&body).map_err(|e| CommunicationFailure::Malformed(e.to_string()))?;

        tracing::debug!(
            table = %query.table,
            rows = parsed.data.len(),
            actor = %caller.actor.key(),
            "read service query"
        );
        Ok(parsed.data)
    }
}
