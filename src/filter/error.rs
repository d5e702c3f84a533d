use thiserror::Error;

use crate::tables::Table;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Invalid filter field '{column}' for table {table}")]
    InvalidColumn { table: Table, column: String },

    #[error("Filtering on '{0}' is not allowed")]
    ProtectedColumn(String),
}
