//! RBAC Gate
//!
//! Role check that runs before any tool business logic. On denial the
//! tool's side-effecting logic is never reached.

use crate::claims::Principal;
use crate::error::{AuthError, Result};

/// True if `required_roles` is empty, or the principal holds at least one
/// of the required roles.
pub fn authorize(principal: &Principal, required_roles: &[String]) -> bool {
    required_roles.is_empty() || required_roles.iter().any(|role| principal.has_role(role))
}

/// [`authorize`] as a guard, producing the denial error used on the wire.
pub fn require(principal: &Principal, required_roles: &[String]) -> Result<()> {
    if authorize(principal, required_roles) {
        Ok(())
    } else {
        Err(AuthError::PermissionDenied(format!(
            "subject '{}' lacks required role ({})",
            principal.subject,
            required_roles.join(", ")
        )))
    }
}
