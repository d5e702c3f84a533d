//! Static per-table dispatch table.
//!
//! Every table the services touch is a `Table` variant mapped to one
//! `TableAccess` entry: which roles may perform each operation, which fields
//! are accepted or exposed, which constraint hook runs before a write, and
//! how rows are removed.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::actor::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Student,
    Teacher,
    Admin,
    Course,
    Enrollment,
}

/// Constraint work performed before rows are inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertHook {
    /// Global email / CNIC / phone uniqueness across the account tables
    AccountUniqueness,
    CourseNameUniqueness,
    EnrollmentBatch,
}

/// Authorization and data rules applied before an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateHook {
    /// Student or teacher: admin or self, password change flow
    Account,
    /// Admin: self only, password change always needs the current password
    AdminAccount,
    Course,
    Immutable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Row removed
    Hard,
    /// `isDeleted = true`
    SoftFlag,
    /// `isDeleted = true, status = 'inactive'`
    SoftDeactivate,
}

#[derive(Debug)]
pub struct TableAccess {
    pub table: Table,
    pub create_roles: &'static [Role],
    pub read_roles: &'static [Role],
    pub update_roles: &'static [Role],
    pub delete_roles: &'static [Role],
    pub insert_fields: &'static [&'static str],
    pub update_fields: &'static [&'static str],
    pub select_fields: &'static [&'static str],
    /// Every stored column; anything else is rejected before SQL is built
    pub columns: &'static [&'static str],
    pub insert_hook: InsertHook,
    pub update_hook: UpdateHook,
    pub delete_mode: DeleteMode,
    pub update_denied: &'static str,
    pub delete_denied: &'static str,
}

const ALL_ROLES: &[Role] = &[Role::Admin, Role::Teacher, Role::Student];
const ADMIN_ONLY: &[Role] = &[Role::Admin];

const ACCOUNT_INSERT_FIELDS: &[&str] = &["name", "email", "password", "phone", "gender", "cnic", "status"];
const ACCOUNT_UPDATE_FIELDS: &[&str] = &["name", "email", "cnic", "phone", "status", "gender"];
const ACCOUNT_SELECT_FIELDS: &[&str] =
    &["id", "name", "email", "phone", "gender", "cnic", "status", "isDeleted", "created_at"];
const ACCOUNT_COLUMNS: &[&str] = &[
    "id", "name", "email", "password", "phone", "gender", "cnic", "status", "isDeleted", "created_at",
];

static STUDENT: TableAccess = TableAccess {
    table: Table::Student,
    create_roles: ADMIN_ONLY,
    read_roles: ALL_ROLES,
    update_roles: &[Role::Admin, Role::Student],
    delete_roles: ADMIN_ONLY,
    insert_fields: ACCOUNT_INSERT_FIELDS,
    update_fields: ACCOUNT_UPDATE_FIELDS,
    select_fields: ACCOUNT_SELECT_FIELDS,
    columns: ACCOUNT_COLUMNS,
    insert_hook: InsertHook::AccountUniqueness,
    update_hook: UpdateHook::Account,
    delete_mode: DeleteMode::SoftDeactivate,
    update_denied: "Forbidden",
    delete_denied: "Only admin can delete students",
};

static TEACHER: TableAccess = TableAccess {
    table: Table::Teacher,
    create_roles: ADMIN_ONLY,
    read_roles: ALL_ROLES,
    update_roles: &[Role::Admin, Role::Teacher],
    delete_roles: ADMIN_ONLY,
    insert_fields: ACCOUNT_INSERT_FIELDS,
    update_fields: ACCOUNT_UPDATE_FIELDS,
    select_fields: ACCOUNT_SELECT_FIELDS,
    columns: ACCOUNT_COLUMNS,
    insert_hook: InsertHook::AccountUniqueness,
    update_hook: UpdateHook::Account,
    delete_mode: DeleteMode::SoftDeactivate,
    update_denied: "Forbidden",
    delete_denied: "Only admin can delete teachers",
};

static ADMIN: TableAccess = TableAccess {
    table: Table::Admin,
    create_roles: ADMIN_ONLY,
    read_roles: ALL_ROLES,
    update_roles: ADMIN_ONLY,
    delete_roles: ADMIN_ONLY,
    insert_fields: ACCOUNT_INSERT_FIELDS,
    update_fields: &["name", "email"],
    select_fields: ACCOUNT_SELECT_FIELDS,
    columns: ACCOUNT_COLUMNS,
    insert_hook: InsertHook::AccountUniqueness,
    update_hook: UpdateHook::AdminAccount,
    delete_mode: DeleteMode::SoftDeactivate,
    update_denied: "Admins can only update their own account",
    delete_denied: "Only admins can delete admins",
};

static COURSE: TableAccess = TableAccess {
    table: Table::Course,
    create_roles: ADMIN_ONLY,
    read_roles: ALL_ROLES,
    update_roles: ADMIN_ONLY,
    delete_roles: &[Role::Admin, Role::Teacher],
    insert_fields: &["name", "teacherId", "credit_hours", "isDeleted"],
    update_fields: &["name", "teacherId", "credit_hours"],
    select_fields: &["id", "name", "teacherId", "credit_hours", "isDeleted", "created_at"],
    columns: &["id", "name", "teacherId", "credit_hours", "isDeleted", "created_at"],
    insert_hook: InsertHook::CourseNameUniqueness,
    update_hook: UpdateHook::Course,
    delete_mode: DeleteMode::SoftFlag,
    update_denied: "Only admins can update courses",
    delete_denied: "Only admins or teachers can delete courses",
};

static ENROLLMENT: TableAccess = TableAccess {
    table: Table::Enrollment,
    create_roles: &[Role::Student, Role::Admin],
    read_roles: ALL_ROLES,
    update_roles: &[],
    delete_roles: ALL_ROLES,
    insert_fields: &["studentId", "courseId"],
    update_fields: &[],
    select_fields: &["id", "studentId", "courseId", "created_at"],
    columns: &["id", "studentId", "courseId", "created_at"],
    insert_hook: InsertHook::EnrollmentBatch,
    update_hook: UpdateHook::Immutable,
    delete_mode: DeleteMode::Hard,
    update_denied: "Enrollments cannot be updated",
    delete_denied: "Access denied",
};

impl Table {
    pub const ALL: [Table; 5] = [Table::Student, Table::Teacher, Table::Admin, Table::Course, Table::Enrollment];

    /// Account tables searched for email / CNIC / phone conflicts, in lookup order
    pub const ACCOUNTS: [Table; 3] = [Table::Student, Table::Teacher, Table::Admin];

    pub fn access(&self) -> &'static TableAccess {
        match self {
            Table::Student => &STUDENT,
            Table::Teacher => &TEACHER,
            Table::Admin => &ADMIN,
            Table::Course => &COURSE,
            Table::Enrollment => &ENROLLMENT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Student => "student",
            Table::Teacher => "teacher",
            Table::Admin => "admin",
            Table::Course => "course",
            Table::Enrollment => "enrollment",
        }
    }

    /// Capitalized name for user-facing messages ("Student not found")
    pub fn label(&self) -> &'static str {
        match self {
            Table::Student => "Student",
            Table::Teacher => "Teacher",
            Table::Admin => "Admin",
            Table::Course => "Course",
            Table::Enrollment => "Enrollment",
        }
    }

    pub fn is_account(&self) -> bool {
        Self::ACCOUNTS.contains(self)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.access().columns.contains(&column)
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| format!("unknown table '{}'", s))
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_parse_case_insensitively() {
        assert_eq!(" Course ".parse::<Table>().unwrap(), Table::Course);
        assert_eq!("ENROLLMENT".parse::<Table>().unwrap(), Table::Enrollment);
        assert!("tokens".parse::<Table>().is_err());
    }

    #[test]
    fn every_entry_describes_its_own_table() {
        for table in Table::ALL {
            assert_eq!(table.access().table, table);
        }
    }

    #[test]
    fn exposed_fields_are_stored_columns() {
        for table in Table::ALL {
            let access = table.access();
            for field in access
                .select_fields
                .iter()
                .chain(access.insert_fields)
                .chain(access.update_fields)
            {
                assert!(table.has_column(field), "{}.{} is not a column", table, field);
            }
        }
    }

    #[test]
    fn password_is_never_selected_by_default() {
        for table in Table::ACCOUNTS {
            assert!(!table.access().select_fields.contains(&"password"));
            assert!(table.has_column("password"));
        }
    }
}
