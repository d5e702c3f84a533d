//! Equality filters shared by the Read Service and the storage layer.
//!
//! A filter is a column plus one or more accepted values: one value means
//! `=`, several mean `IN`. Values are compared as text so a query-string
//! value matches integer, boolean and string columns alike.

pub mod error;

use crate::record::{value_to_param, Record};
use crate::tables::Table;

pub use error::FilterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn matches(&self, record: &Record) -> bool {
        record
            .get(&self.column)
            .and_then(value_to_param)
            .map(|v| self.values.iter().any(|want| *want == v))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters(Vec<Filter>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.set(column, vec![value.to_string()]);
        self
    }

    pub fn any_of<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.set(column, values.into_iter().map(|v| v.to_string()).collect());
        self
    }

    /// Add a filter from a raw query-string value. Comma-separated values mean
    /// "any of"; empty values are ignored.
    pub fn push_raw(&mut self, column: &str, raw: &str) {
        let values: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if !values.is_empty() {
            self.set(column, values);
        }
    }

    /// Replace any existing filter on `column`
    pub fn set(&mut self, column: &str, values: Vec<String>) {
        self.0.retain(|f| f.column != column);
        self.0.push(Filter { column: column.to_string(), values });
    }

    pub fn get(&self, column: &str) -> Option<&Filter> {
        self.0.iter().find(|f| f.column == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.0.iter().all(|f| f.matches(record))
    }

    /// Reject columns the table does not store
    pub fn validate(&self, table: Table) -> Result<(), FilterError> {
        for filter in &self.0 {
            if !table.has_column(&filter.column) {
                return Err(FilterError::InvalidColumn { table, column: filter.column.clone() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn comma_lists_mean_any_of() {
        let mut filters = Filters::new();
        filters.push_raw("teacherId", "3, 4,,9");
        assert_eq!(filters.get("teacherId").unwrap().values, vec!["3", "4", "9"]);
        assert!(filters.matches(&rec(json!({"teacherId": 4}))));
        assert!(!filters.matches(&rec(json!({"teacherId": 5}))));
    }

    #[test]
    fn empty_values_are_ignored() {
        let mut filters = Filters::new();
        filters.push_raw("name", "");
        filters.push_raw("email", " , ");
        assert!(filters.is_empty());
    }

    #[test]
    fn later_filters_replace_earlier_ones() {
        let filters = Filters::new().eq("studentId", 9).eq("studentId", 5);
        assert_eq!(filters.get("studentId").unwrap().values, vec!["5"]);
    }

    #[test]
    fn text_comparison_spans_types() {
        let filters = Filters::new().eq("isDeleted", "false").eq("id", "7");
        assert!(filters.matches(&rec(json!({"id": 7, "isDeleted": false}))));
        assert!(!filters.matches(&rec(json!({"id": 7}))));
    }

    #[test]
    fn unknown_columns_fail_validation() {
        let filters = Filters::new().eq("salary", 1);
        assert!(matches!(
            filters.validate(Table::Teacher),
            Err(FilterError::InvalidColumn { .. })
        ));
        assert!(Filters::new().eq("teacherId", 1).validate(Table::Course).is_ok());
    }
}
