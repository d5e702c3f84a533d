use axum::http::HeaderMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::ApiError;
use crate::record::value_as_i64;
use crate::tables::Table;

pub const X_USER_HEADER: &str = "x-user";

/// Account type of a caller. Each role owns one user table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::Teacher, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    /// The table holding accounts of this role
    pub fn table(&self) -> Table {
        match self {
            Role::Student => Table::Student,
            Role::Teacher => Table::Teacher,
            Role::Admin => Table::Admin,
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the caller as carried by the `X-User` header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    #[serde(rename = "type")]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_as_i64(&value).ok_or_else(|| serde::de::Error::custom("id must be an integer"))
}

impl Actor {
    pub fn new(id: i64, role: Role) -> Self {
        Self { id, role, name: None, email: None }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when `(table, id)` is the caller's own account row.
    pub fn is_self(&self, table: Table, id: i64) -> bool {
        self.role.table() == table && self.id == id
    }

    /// Rate-limit / logging key, `"<type>:<id>"`
    pub fn key(&self) -> String {
        format!("{}:{}", self.role, self.id)
    }

    pub fn to_header_value(&self) -> String {
        // Actor holds only strings and integers, serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let raw = headers
            .get(X_USER_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;

        let raw = raw
            .to_str()
            .map_err(|_| ApiError::bad_request("Invalid x-user header format"))?;

        serde_json::from_str(raw).map_err(|_| ApiError::bad_request("Invalid x-user header format"))
    }
}

/// Caller identity plus the raw `Authorization` value, forwarded verbatim on
/// every Read Service call made on the caller's behalf.
#[derive(Debug, Clone)]
pub struct Caller {
    pub actor: Actor,
    pub authorization: Option<String>,
}

impl Caller {
    pub fn new(actor: Actor, authorization: Option<String>) -> Self {
        Self { actor, authorization }
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let actor = Actor::from_headers(headers)?;
        let authorization = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Self { actor, authorization })
    }
}
