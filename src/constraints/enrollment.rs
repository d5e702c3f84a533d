use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::actor::Role;
use crate::constraints::{CheckResult, ConstraintChecker, Verdict, Violation};
use crate::read_client::{CommunicationFailure, ConstraintQuery};
use crate::record::{field_i64, is_deleted};
use crate::tables::Table;

/// Credit-hour ceiling per student across live courses, inclusive.
pub const MAX_CREDIT_HOURS: i64 = 15;

/// One requested enrollment. `student_id` may be omitted by a student actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentRequest {
    pub student_id: Option<i64>,
    pub course_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Enrollment {
    #[serde(rename = "studentId")]
    pub student_id: i64,
    #[serde(rename = "courseId")]
    pub course_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyEnrolled,
    CreditLimit { current: i64, requested: i64 },
}

impl SkipReason {
    pub fn violation(&self) -> Violation {
        match self {
            SkipReason::AlreadyEnrolled => Violation::uniqueness("Student is already enrolled in this course"),
            SkipReason::CreditLimit { current, requested } => Violation::capacity(format!(
                "Credit hours would exceed {}: {} enrolled + {} requested",
                MAX_CREDIT_HOURS, current, requested
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub accepted: Vec<Enrollment>,
    pub skipped: Vec<(Enrollment, SkipReason)>,
}

/// What one student already holds, including records accepted earlier in the batch.
#[derive(Debug, Default)]
struct StudentLedger {
    courses: HashSet<i64>,
    credit_hours: i64,
}

impl ConstraintChecker<'_> {
    /// Filter an enrollment batch down to the records that may be inserted.
    ///
    /// Duplicates and records that would push a student over
    /// [`MAX_CREDIT_HOURS`] are skipped rather than failing the batch. A course
    /// that does not exist denies the whole batch.
    pub async fn validate_enrollment_batch(&self, records: &[EnrollmentRequest]) -> CheckResult<BatchOutcome> {
        let actor = self.actor();
        let mut ledgers: HashMap<i64, StudentLedger> = HashMap::new();
        let mut outcome = BatchOutcome::default();

        for request in records {
            let student_id = match (actor.role, request.student_id) {
                (Role::Student, _) => actor.id,
                (_, Some(id)) => id,
                (_, None) => return Ok(Verdict::Deny(Violation::referential("studentId is required"))),
            };
            let enrollment = Enrollment { student_id, course_id: request.course_id };

            let course = match self.fetch_one(Table::Course, request.course_id, false).await? {
                Some(course) if !is_deleted(&course) => course,
                _ => {
                    return Ok(Verdict::Deny(Violation::referential(format!(
                        "Invalid courseId {}: course does not exist",
                        request.course_id
                    ))))
                }
            };
            let requested = field_i64(&course, "credit_hours").unwrap_or(0);

            if !ledgers.contains_key(&student_id) {
                let ledger = self.load_ledger(student_id).await?;
                ledgers.insert(student_id, ledger);
            }
            let Some(ledger) = ledgers.get_mut(&student_id) else {
                continue;
            };

            if ledger.courses.contains(&request.course_id) {
                outcome.skipped.push((enrollment, SkipReason::AlreadyEnrolled));
                continue;
            }
            if ledger.credit_hours + requested > MAX_CREDIT_HOURS {
                tracing::info!(
                    student_id,
                    course_id = request.course_id,
                    current = ledger.credit_hours,
                    requested,
                    "enrollment skipped, credit limit"
                );
                let reason = SkipReason::CreditLimit { current: ledger.credit_hours, requested };
                outcome.skipped.push((enrollment, reason));
                continue;
            }

            ledger.courses.insert(request.course_id);
            ledger.credit_hours += requested;
            outcome.accepted.push(enrollment);
        }

        Ok(Verdict::Allow(outcome))
    }

    async fn load_ledger(&self, student_id: i64) -> Result<StudentLedger, CommunicationFailure> {
        let enrollments = self
            .fetch(ConstraintQuery::table(Table::Enrollment).filter("studentId", student_id))
            .await?;
        let courses: HashSet<i64> = enrollments.iter().filter_map(|e| field_i64(e, "courseId")).collect();
        if courses.is_empty() {
            return Ok(StudentLedger::default());
        }

        let mut ids: Vec<i64> = courses.iter().copied().collect();
        ids.sort_unstable();
        let enrolled = self.fetch(ConstraintQuery::table(Table::Course).any_of("id", &ids)).await?;
        let credit_hours = enrolled
            .iter()
            .filter(|c| !is_deleted(c))
            .filter_map(|c| field_i64(c, "credit_hours"))
            .sum();

        Ok(StudentLedger { courses, credit_hours })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ViolationKind;
    use crate::testing::{caller, Fixture};
    use serde_json::json;

    /// Student 1 enrolled in courses worth 3+3+3+3+1 = 13 credit hours.
    async fn student_with_thirteen_hours(fx: &Fixture) -> i64 {
        let student = fx.seed(Table::Student, json!({"name": "S", "email": "s@school.pk"})).await;
        for (n, hours) in [3, 3, 3, 3, 1].into_iter().enumerate() {
            let course = fx
                .seed(Table::Course, json!({"name": format!("Course {}", n), "teacherId": 1, "credit_hours": hours}))
                .await;
            fx.seed(Table::Enrollment, json!({"studentId": student, "courseId": course})).await;
        }
        student
    }

    fn request(student_id: Option<i64>, course_id: i64) -> EnrollmentRequest {
        EnrollmentRequest { student_id, course_id }
    }

    #[tokio::test]
    async fn credit_limit_is_inclusive_at_fifteen() {
        let fx = Fixture::new();
        let student = student_with_thirteen_hours(&fx).await;
        let three = fx.seed(Table::Course, json!({"name": "Three", "teacherId": 1, "credit_hours": 3})).await;
        let two = fx.seed(Table::Course, json!({"name": "Two", "teacherId": 1, "credit_hours": 2})).await;
        let admin = caller(1, Role::Admin);
        let checker = fx.checker(&admin);

        let outcome = checker
            .validate_enrollment_batch(&[request(Some(student), three)])
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.skipped[0].1, SkipReason::CreditLimit { current: 13, requested: 3 });
        assert_eq!(outcome.skipped[0].1.violation().kind, ViolationKind::CapacityExceeded);

        let outcome = checker
            .validate_enrollment_batch(&[request(Some(student), two)])
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(outcome.accepted, vec![Enrollment { student_id: student, course_id: two }]);
    }

    #[tokio::test]
    async fn earlier_records_in_the_batch_count_toward_the_limit() {
        let fx = Fixture::new();
        let student = student_with_thirteen_hours(&fx).await;
        let one = fx.seed(Table::Course, json!({"name": "One", "teacherId": 1, "credit_hours": 1})).await;
        let other = fx.seed(Table::Course, json!({"name": "Another", "teacherId": 1, "credit_hours": 2})).await;
        let admin = caller(1, Role::Admin);

        let outcome = fx
            .checker(&admin)
            .validate_enrollment_batch(&[request(Some(student), one), request(Some(student), other)])
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(outcome.accepted, vec![Enrollment { student_id: student, course_id: one }]);
        assert_eq!(outcome.skipped.len(), 1);
    }

    #[tokio::test]
    async fn already_enrolled_pairs_are_skipped_quietly() {
        let fx = Fixture::new();
        let course = fx.seed(Table::Course, json!({"name": "Algorithms", "teacherId": 1, "credit_hours": 3})).await;
        fx.seed(Table::Enrollment, json!({"studentId": 4, "courseId": course})).await;
        let student = caller(4, Role::Student);

        let outcome = fx
            .checker(&student)
            .validate_enrollment_batch(&[request(None, course), request(None, course)])
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.skipped.len(), 2);
        assert!(outcome.skipped.iter().all(|(_, r)| *r == SkipReason::AlreadyEnrolled));
    }

    #[tokio::test]
    async fn duplicates_within_one_batch_are_accepted_once() {
        let fx = Fixture::new();
        let course = fx.seed(Table::Course, json!({"name": "Algorithms", "teacherId": 1, "credit_hours": 3})).await;
        let student = caller(4, Role::Student);

        let outcome = fx
            .checker(&student)
            .validate_enrollment_batch(&[request(None, course), request(None, course)])
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.skipped, vec![(outcome.accepted[0], SkipReason::AlreadyEnrolled)]);
    }

    #[tokio::test]
    async fn student_actor_always_enrolls_themselves() {
        let fx = Fixture::new();
        let course = fx.seed(Table::Course, json!({"name": "Algorithms", "teacherId": 1, "credit_hours": 3})).await;
        let student = caller(4, Role::Student);

        let outcome = fx
            .checker(&student)
            .validate_enrollment_batch(&[request(Some(99), course)])
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(outcome.accepted, vec![Enrollment { student_id: 4, course_id: course }]);
    }

    #[tokio::test]
    async fn enrollments_are_fetched_once_per_student() {
        let fx = Fixture::new();
        let a = fx.seed(Table::Course, json!({"name": "A", "teacherId": 1, "credit_hours": 1})).await;
        let b = fx.seed(Table::Course, json!({"name": "B", "teacherId": 1, "credit_hours": 1})).await;
        let student = caller(4, Role::Student);

        fx.checker(&student)
            .validate_enrollment_batch(&[request(None, a), request(None, b)])
            .await
            .unwrap();
        let enrollment_queries = fx.read.calls().iter().filter(|q| q.table == Table::Enrollment).count();
        assert_eq!(enrollment_queries, 1);
    }

    #[tokio::test]
    async fn deleted_courses_do_not_count_toward_the_limit() {
        let fx = Fixture::new();
        let gone = fx
            .seed(Table::Course, json!({"name": "Gone", "teacherId": 1, "credit_hours": 3, "isDeleted": true}))
            .await;
        for _ in 0..5 {
            fx.seed(Table::Enrollment, json!({"studentId": 4, "courseId": gone})).await;
        }
        let live = fx.seed(Table::Course, json!({"name": "Live", "teacherId": 1, "credit_hours": 3})).await;
        let student = caller(4, Role::Student);

        let outcome = fx
            .checker(&student)
            .validate_enrollment_batch(&[request(None, live)])
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(outcome.accepted.len(), 1);
    }

    #[tokio::test]
    async fn unknown_course_denies_the_batch() {
        let fx = Fixture::new();
        let student = caller(4, Role::Student);

        let verdict = fx.checker(&student).validate_enrollment_batch(&[request(None, 42)]).await.unwrap();
        assert_eq!(
            verdict,
            Verdict::Deny(Violation::referential("Invalid courseId 42: course does not exist"))
        );
    }

    #[tokio::test]
    async fn read_failure_aborts_the_batch() {
        let fx = Fixture::new();
        fx.read.fail_with_status(502);
        let student = caller(4, Role::Student);
        assert!(fx.checker(&student).validate_enrollment_batch(&[request(None, 1)]).await.is_err());
    }
}
