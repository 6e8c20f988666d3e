//! Role capability table for review operations
//!
//! A closed mapping from operation to the roles allowed to perform it,
//! checked once at the top of each transition. Object-level rules (assigned
//! reviewer, self-review) stay in the engine.

use genatlas_common::db::{Role, User};
use genatlas_common::{Error, Result};

/// Review operations subject to role authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Assign,
    Submit,
    Approve,
    Reject,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Assign => "assign",
            Operation::Submit => "submit",
            Operation::Approve => "approve",
            Operation::Reject => "reject",
        }
    }
}

/// Roles allowed to perform an operation
pub fn allowed_roles(op: Operation) -> &'static [Role] {
    match op {
        Operation::Assign => &[Role::Annotator, Role::Validator],
        Operation::Submit => &[Role::Annotator, Role::Validator],
        Operation::Approve => &[Role::Validator],
        Operation::Reject => &[Role::Validator],
    }
}

/// Check the acting user's role against the capability table
pub fn authorize(op: Operation, user: &User) -> Result<()> {
    if allowed_roles(op).contains(&user.role) {
        Ok(())
    } else {
        Err(Error::Forbidden(format!(
            "role {} cannot {}",
            user.role.as_str(),
            op.as_str()
        )))
    }
}
