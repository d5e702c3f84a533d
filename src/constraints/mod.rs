//! Constraint Checker.
//!
//! Decides whether a proposed insert, update or delete may proceed by reading
//! related rows through the Read Service and applying a table-specific
//! predicate. Checks are strictly read-only and run sequentially; the caller
//! writes only after every check allowed the mutation.
//!
//! Outcomes are two-layered. A `Violation` is ordinary data carried in
//! `Verdict::Deny`. A `CommunicationFailure` is the `Err` side and aborts the
//! whole request: nothing is retried and nothing is partially applied.
//!
//! Checks see a point-in-time snapshot with no locking. Two concurrent
//! requests can both pass a uniqueness check before either row is written;
//! only storage-level unique constraints close that window.

pub mod deletion;
pub mod enrollment;
pub mod uniqueness;

use serde::Serialize;

use crate::actor::{Actor, Caller};
use crate::read_client::{CommunicationFailure, ConstraintQuery, ReadSource};
use crate::record::Record;
use crate::tables::Table;

pub use enrollment::{BatchOutcome, Enrollment, EnrollmentRequest, SkipReason, MAX_CREDIT_HOURS};
pub use uniqueness::CandidateFields;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationKind {
    Uniqueness,
    ReferentialIntegrity,
    CapacityExceeded,
    Forbidden,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn uniqueness(message: impl Into<String>) -> Self {
        Self::new(ViolationKind::Uniqueness, message)
    }

    pub fn referential(message: impl Into<String>) -> Self {
        Self::new(ViolationKind::ReferentialIntegrity, message)
    }

    pub fn capacity(message: impl Into<String>) -> Self {
        Self::new(ViolationKind::CapacityExceeded, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ViolationKind::Forbidden, message)
    }
}

/// Allow/deny decision. `T` carries what an allowed check produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<T = ()> {
    Allow(T),
    Deny(Violation),
}

impl<T> Verdict<T> {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow(_))
    }

    pub fn into_result(self) -> Result<T, Violation> {
        match self {
            Verdict::Allow(value) => Ok(value),
            Verdict::Deny(violation) => Err(violation),
        }
    }
}

pub type CheckResult<T = ()> = Result<Verdict<T>, CommunicationFailure>;

/// Runs checks on behalf of one caller; every Read Service call forwards
/// that caller's identity.
pub struct ConstraintChecker<'a> {
    read: &'a dyn ReadSource,
    caller: &'a Caller,
}

impl<'a> ConstraintChecker<'a> {
    pub fn new(read: &'a dyn ReadSource, caller: &'a Caller) -> Self {
        Self { read, caller }
    }

    pub fn actor(&self) -> &Actor {
        &self.caller.actor
    }

    async fn fetch(&self, query: ConstraintQuery) -> Result<Vec<Record>, CommunicationFailure> {
        self.read.fetch(self.caller, &query).await.map_err(|err| {
            tracing::error!(
                actor_id = self.caller.actor.id,
                actor_type = %self.caller.actor.role,
                table = %query.table,
                error = %err,
                "read service call failed during constraint check"
            );
            err
        })
    }

    /// Fetch one row by id, optionally with its password hash.
    pub async fn fetch_one(
        &self,
        table: Table,
        id: i64,
        with_password: bool,
    ) -> Result<Option<Record>, CommunicationFailure> {
        let mut query = ConstraintQuery::table(table).filter("id", id);
        if with_password {
            query = query.with_password();
        }
        Ok(self.fetch(query).await?.into_iter().next())
    }
}
