//! Record snapshots as they travel between services.
//!
//! Rows are kept as JSON maps because the Read Service returns whatever
//! columns a table exposes. The helpers below read fields leniently: ids may
//! arrive as numbers or numeric strings, and `isDeleted` as a boolean or as
//! the `0`/`1` integers some storage backends produce.

use serde_json::{Map, Value};

pub type Record = Map<String, Value>;

pub const ID: &str = "id";
pub const IS_DELETED: &str = "isDeleted";

/// Interpret a JSON value as an integer id.
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn field_i64(record: &Record, key: &str) -> Option<i64> {
    record.get(key).and_then(value_as_i64)
}

pub fn field_str<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

pub fn record_id(record: &Record) -> Option<i64> {
    field_i64(record, ID)
}

/// Soft-delete flag. A missing flag means the row is live.
pub fn is_deleted(record: &Record) -> bool {
    match record.get(IS_DELETED) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().map(|i| i != 0).unwrap_or(false),
        Some(Value::String(s)) => matches!(s.as_str(), "1" | "true" | "TRUE" | "True"),
        _ => false,
    }
}

/// Render a scalar the way it appears in a query string or text comparison.
pub fn value_to_param(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
