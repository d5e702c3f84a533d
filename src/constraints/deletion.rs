use std::collections::HashSet;

use crate::actor::Role;
use crate::constraints::{CheckResult, ConstraintChecker, Verdict, Violation};
use crate::read_client::ConstraintQuery;
use crate::record::{field_i64, is_deleted, record_id};
use crate::tables::Table;

impl ConstraintChecker<'_> {
    /// Referential and ownership rules that must hold before `ids` of `table`
    /// are removed. Dependents are fetched with one comma-joined query.
    pub async fn check_deletable(&self, table: Table, ids: &[i64]) -> CheckResult {
        match table {
            Table::Teacher => {
                let courses = self.fetch(ConstraintQuery::table(Table::Course).any_of("teacherId", ids)).await?;
                if courses.iter().any(|c| !is_deleted(c)) {
                    return Ok(Verdict::Deny(Violation::referential("Cannot delete teacher with active courses")));
                }
                Ok(Verdict::Allow(()))
            }
            Table::Student => {
                let enrollments = self
                    .fetch(ConstraintQuery::table(Table::Enrollment).any_of("studentId", ids))
                    .await?;
                if !enrollments.is_empty() {
                    return Ok(Verdict::Deny(Violation::referential(
                        "Cannot delete student with active enrollments",
                    )));
                }
                Ok(Verdict::Allow(()))
            }
            Table::Course => {
                let enrollments = self
                    .fetch(ConstraintQuery::table(Table::Enrollment).any_of("courseId", ids))
                    .await?;
                if !enrollments.is_empty() {
                    return Ok(Verdict::Deny(Violation::referential("Cannot delete course with enrolled students")));
                }
                Ok(Verdict::Allow(()))
            }
            Table::Enrollment => self.check_enrollment_ownership(ids).await,
            Table::Admin => {
                if self.actor().is_admin() {
                    Ok(Verdict::Allow(()))
                } else {
                    Ok(Verdict::Deny(Violation::forbidden("Only admins can delete admins")))
                }
            }
        }
    }

    async fn check_enrollment_ownership(&self, ids: &[i64]) -> CheckResult {
        let actor = self.actor();
        if actor.is_admin() {
            return Ok(Verdict::Allow(()));
        }

        let wanted: HashSet<i64> = ids.iter().copied().collect();
        let rows = self.fetch(ConstraintQuery::table(Table::Enrollment).any_of("id", ids)).await?;

        match actor.role {
            Role::Student => {
                // The Read Service narrows a student's view to their own rows,
                // so an id that did not come back belongs to someone else.
                let owned: HashSet<i64> = rows
                    .iter()
                    .filter(|r| field_i64(r, "studentId") == Some(actor.id))
                    .filter_map(record_id)
                    .collect();
                if !wanted.is_subset(&owned) {
                    return Ok(Verdict::Deny(Violation::forbidden(
                        "Students can only delete their own enrollments",
                    )));
                }
                Ok(Verdict::Allow(()))
            }
            Role::Teacher => {
                let found: HashSet<i64> = rows.iter().filter_map(record_id).collect();
                if rows.is_empty() || !wanted.is_subset(&found) {
                    return Ok(Verdict::Deny(Violation::referential("No enrollments found")));
                }

                let course_ids: Vec<i64> = rows
                    .iter()
                    .filter_map(|r| field_i64(r, "courseId"))
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect();
                let courses = self
                    .fetch(ConstraintQuery::table(Table::Course).any_of("id", &course_ids))
                    .await?;

                let taught: HashSet<i64> = courses
                    .iter()
                    .filter(|c| field_i64(c, "teacherId") == Some(actor.id))
                    .filter_map(record_id)
                    .collect();
                if course_ids.iter().any(|id| !taught.contains(id)) {
                    return Ok(Verdict::Deny(Violation::forbidden(
                        "Teachers can only delete enrollments in their own courses",
                    )));
                }
                Ok(Verdict::Allow(()))
            }
            Role::Admin => Ok(Verdict::Allow(())),
        }
    }
}
