//! Role/Access Gate: decides `(table, operation, actor)` before any I/O.

use crate::actor::{Actor, Role};
use crate::tables::{Table, TableAccess, UpdateHook};
use crate::types::Operation;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AccessDenied {
    pub table: Table,
    pub operation: Operation,
    pub role: Role,
    pub message: &'static str,
}

pub fn authorize(table: Table, operation: Operation, role: Role) -> Result<&'static TableAccess, AccessDenied> {
    let access = table.access();
    let (roles, message) = match operation {
        Operation::Create => (access.create_roles, "Access denied for this operation"),
        Operation::Read => (access.read_roles, "Access denied"),
        Operation::Update => (access.update_roles, access.update_denied),
        Operation::Delete => (access.delete_roles, access.delete_denied),
    };

    if roles.contains(&role) {
        Ok(access)
    } else {
        Err(AccessDenied { table, operation, role, message })
    }
}

/// Update gate: the role table plus the self-scoped rules of each update hook.
pub fn authorize_update(table: Table, actor: &Actor, id: i64) -> Result<&'static TableAccess, AccessDenied> {
    let access = authorize(table, Operation::Update, actor.role)?;

    let allowed = match access.update_hook {
        UpdateHook::Account => actor.is_admin() || actor.is_self(table, id),
        UpdateHook::AdminAccount => actor.is_self(table, id),
        UpdateHook::Course => actor.is_admin(),
        UpdateHook::Immutable => false,
    };

    if allowed {
        Ok(access)
    } else {
        Err(AccessDenied {
            table,
            operation: Operation::Update,
            role: actor.role,
            message: access.update_denied,
        })
    }
}
