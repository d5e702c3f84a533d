//! Request payload validation.
//!
//! Each table has a fixed schema: the accepted fields, which are required, and
//! the format each must match. Validation collects every field error instead
//! of stopping at the first, and returns a cleaned record holding only the
//! fields the table accepts.

pub mod payload;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::record::{value_as_i64, Record};

pub use payload::{
    parse_insert, parse_update, unwrap_payload, validate_delete, validate_insert, validate_login, validate_path_id,
    validate_register, validate_update, DeleteRequest, LoginRequest, RegisterRequest, UpdateRequest,
};

pub const VALIDATION_FAILED: &str = "Validation failed";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationErrors {
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl Default for ValidationErrors {
    fn default() -> Self {
        Self { message: VALIDATION_FAILED.to_string(), fields: BTreeMap::new() }
    }
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request-level error with no per-field detail
    pub fn message(message: impl Into<String>) -> Self {
        Self { message: message.into(), fields: BTreeMap::new() }
    }

    /// Record an error; the first error reported for a field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

/// `NNNNN-NNNNNNN-N`
pub fn is_valid_cnic(cnic: &str) -> bool {
    let parts: Vec<&str> = cnic.split('-').collect();
    matches!(parts.as_slice(), [a, b, c]
        if a.len() == 5 && b.len() == 7 && c.len() == 1
            && parts.iter().all(|p| p.bytes().all(|d| d.is_ascii_digit())))
}

/// `03` followed by nine digits
pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 11 && phone.starts_with("03") && phone.bytes().all(|d| d.is_ascii_digit())
}

/// Field read as text. Numbers are accepted and rendered; `null` counts as absent.
pub(crate) fn text(record: &Record, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Field read as an integer: `Ok(None)` when absent or `null`, `Err` when present
/// but not an integer.
pub(crate) fn integer(record: &Record, key: &str) -> Result<Option<i64>, ()> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value_as_i64(value).map(Some).ok_or(()),
    }
}
