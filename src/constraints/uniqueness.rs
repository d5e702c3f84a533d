use crate::constraints::{CheckResult, ConstraintChecker, Verdict, Violation};
use crate::read_client::ConstraintQuery;
use crate::record::{field_str, is_deleted, record_id, Record};
use crate::tables::Table;

pub const DUPLICATE_ACCOUNT: &str = "User with same email, CNIC, or phone already exists";

/// Globally unique account fields present on a candidate row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFields {
    pub email: Option<String>,
    pub cnic: Option<String>,
    pub phone: Option<String>,
}

impl CandidateFields {
    pub fn from_record(record: &Record) -> Self {
        let present = |key: &str| {
            field_str(record, key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self { email: present("email"), cnic: present("cnic"), phone: present("phone") }
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.cnic.is_none() && self.phone.is_none()
    }

    fn conflicts_with(&self, row: &Record) -> bool {
        let same = |candidate: &Option<String>, key: &str| match (candidate, field_str(row, key)) {
            (Some(want), Some(have)) => want == have,
            _ => false,
        };
        same(&self.email, "email") || same(&self.cnic, "cnic") || same(&self.phone, "phone")
    }
}

fn is_excluded(table: Table, row: &Record, exclude: Option<(Table, i64)>) -> bool {
    matches!(exclude, Some((t, id)) if t == table && record_id(row) == Some(id))
}

impl ConstraintChecker<'_> {
    /// No live student, teacher or admin other than `exclude` may share the
    /// candidate's email, CNIC or phone. Stops at the first conflicting table.
    pub async fn check_uniqueness(&self, candidate: &CandidateFields, exclude: Option<(Table, i64)>) -> CheckResult {
        if candidate.is_empty() {
            return Ok(Verdict::Allow(()));
        }

        for table in Table::ACCOUNTS {
            let rows = self.fetch(ConstraintQuery::table(table)).await?;
            let conflict = rows
                .iter()
                .filter(|row| !is_deleted(row))
                .filter(|row| !is_excluded(table, row, exclude))
                .any(|row| candidate.conflicts_with(row));

            if conflict {
                tracing::info!(actor_id = self.actor().id, table = %table, "account uniqueness conflict");
                return Ok(Verdict::Deny(Violation::uniqueness(DUPLICATE_ACCOUNT)));
            }
        }

        Ok(Verdict::Allow(()))
    }

    /// No live course other than `exclude_id` may already use `name`.
    pub async fn check_course_name_unique(&self, name: &str, exclude_id: Option<i64>) -> CheckResult {
        let rows = self.fetch(ConstraintQuery::table(Table::Course)).await?;
        let exclude = exclude_id.map(|id| (Table::Course, id));

        let conflict = rows
            .iter()
            .filter(|row| !is_deleted(row))
            .filter(|row| !is_excluded(Table::Course, row, exclude))
            .any(|row| field_str(row, "name") == Some(name));

        if conflict {
            return Ok(Verdict::Deny(Violation::uniqueness(format!(
                "A course with the name '{}' already exists",
                name
            ))));
        }
        Ok(Verdict::Allow(()))
    }
}
