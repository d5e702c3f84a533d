//! SQL text for the record store.
//!
//! Identifiers are checked against the table's column list and quoted, so the
//! camelCase columns survive Postgres case folding. Values never appear in the
//! SQL: filters bind `text[]` parameters and row payloads bind one `jsonb`
//! parameter expanded with `jsonb_populate_record`, which lets Postgres apply
//! each column's own type.

use crate::database::manager::{quote_identifier, DatabaseError};
use crate::filter::Filters;
use crate::record::Record;
use crate::tables::{DeleteMode, Table};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlResult {
    pub query: String,
    /// One `text[]` parameter per filter, in placeholder order
    pub params: Vec<Vec<String>>,
}

fn checked_columns<'a, I>(table: Table, columns: I) -> Result<Vec<String>, DatabaseError>
where
    I: IntoIterator<Item = &'a str>,
{
    columns
        .into_iter()
        .map(|c| {
            if table.has_column(c) {
                Ok(quote_identifier(c))
            } else {
                Err(DatabaseError::InvalidColumn { table, column: c.to_string() })
            }
        })
        .collect()
}

/// `SELECT` returning each row as a JSON object
pub fn build_select(table: Table, columns: &[&str], filters: &Filters) -> Result<SqlResult, DatabaseError> {
    filters.validate(table)?;
    let select = checked_columns(table, columns.iter().copied())?;
    if select.is_empty() {
        return Err(DatabaseError::EmptyChanges(table));
    }

    let mut conditions = Vec::new();
    let mut params = Vec::new();
    for (i, filter) in filters.iter().enumerate() {
        conditions.push(format!("{}::text = ANY(${})", quote_identifier(&filter.column), i + 1));
        params.push(filter.values.clone());
    }

    let mut inner = format!("SELECT {} FROM {}", select.join(", "), quote_identifier(table.as_str()));
    if !conditions.is_empty() {
        inner.push_str(" WHERE ");
        inner.push_str(&conditions.join(" AND "));
    }
    inner.push_str(" ORDER BY \"id\"");

    Ok(SqlResult { query: format!("SELECT row_to_json(t) AS row FROM ({}) t", inner), params })
}

/// `INSERT` of one row bound as `$1::jsonb`, returning the new id
pub fn build_insert(table: Table, row: &Record) -> Result<String, DatabaseError> {
    let columns = checked_columns(table, row.keys().map(String::as_str))?;
    if columns.is_empty() {
        return Err(DatabaseError::EmptyChanges(table));
    }
    let name = quote_identifier(table.as_str());
    let list = columns.join(", ");

    Ok(format!(
        "INSERT INTO {name} ({list}) SELECT {list} FROM jsonb_populate_record(NULL::{name}, $1::jsonb) RETURNING \"id\""
    ))
}

/// `UPDATE` of one row: changes bound as `$1::jsonb`, id as `$2`
pub fn build_update(table: Table, changes: &Record) -> Result<String, DatabaseError> {
    let columns = checked_columns(table, changes.keys().map(String::as_str))?;
    if columns.is_empty() {
        return Err(DatabaseError::EmptyChanges(table));
    }
    let name = quote_identifier(table.as_str());
    let assignments = columns
        .iter()
        .map(|c| format!("{c} = r.{c}"))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "UPDATE {name} SET {assignments} FROM jsonb_populate_record(NULL::{name}, $1::jsonb) AS r WHERE {name}.\"id\" = $2"
    ))
}

/// Removal of every row whose id is in `$1`
pub fn build_delete(table: Table, mode: DeleteMode) -> String {
    let name = quote_identifier(table.as_str());
    match mode {
        DeleteMode::Hard => format!("DELETE FROM {name} WHERE \"id\" = ANY($1)"),
        DeleteMode::SoftFlag => format!("UPDATE {name} SET \"isDeleted\" = true WHERE \"id\" = ANY($1)"),
        DeleteMode::SoftDeactivate => format!(
            "UPDATE {name} SET \"isDeleted\" = true, \"status\" = 'inactive' WHERE \"id\" = ANY($1)"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_binds_one_array_per_filter() {
        let filters = Filters::new().eq("isDeleted", "false").any_of("teacherId", [3, 4]);
        let sql = build_select(Table::Course, &["id", "name"], &filters).unwrap();
        assert_eq!(
            sql.query,
            "SELECT row_to_json(t) AS row FROM (SELECT \"id\", \"name\" FROM \"course\" \
             WHERE \"isDeleted\"::text = ANY($1) AND \"teacherId\"::text = ANY($2) ORDER BY \"id\") t"
        );
        assert_eq!(sql.params, vec![vec!["false".to_string()], vec!["3".to_string(), "4".to_string()]]);
    }

    #[test]
    fn select_rejects_unknown_columns() {
        let err = build_select(Table::Enrollment, &["id", "grade"], &Filters::new()).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidColumn { .. }));

        let filters = Filters::new().eq("id; DROP TABLE student", 1);
        assert!(build_select(Table::Student, &["id"], &filters).is_err());
    }

    #[test]
    fn insert_lists_columns_once_per_side() {
        let row = json!({"name": "Algorithms", "teacherId": 2}).as_object().cloned().unwrap();
        let sql = build_insert(Table::Course, &row).unwrap();
        assert!(sql.starts_with("INSERT INTO \"course\" (\"name\", \"teacherId\") SELECT \"name\", \"teacherId\""));
        assert!(sql.ends_with("RETURNING \"id\""));
    }

    #[test]
    fn update_requires_changes() {
        assert!(matches!(
            build_update(Table::Course, &Record::new()),
            Err(DatabaseError::EmptyChanges(Table::Course))
        ));
    }

    #[test]
    fn delete_modes() {
        assert_eq!(build_delete(Table::Enrollment, DeleteMode::Hard), "DELETE FROM \"enrollment\" WHERE \"id\" = ANY($1)");
        assert!(build_delete(Table::Teacher, DeleteMode::SoftDeactivate).contains("'inactive'"));
        assert!(!build_delete(Table::Course, DeleteMode::SoftFlag).contains("status"));
    }
}
