//! Role-capability checks.
//!
//! Every protected endpoint declares the set of roles it accepts. A caller is
//! admitted when its role satisfies at least one of them. The only
//! inheritance edge is super-admin → admin; it does not chain further (a
//! super-admin does not satisfy a student-only endpoint).

use thiserror::Error;

use crate::user::Role;

impl Role {
  /// Whether a caller holding `self` may act where `required` is accepted.
  pub fn satisfies(self, required: Role) -> bool {
    self == required || (self == Role::SuperAdmin && required == Role::Admin)
  }
}

/// Rejection produced by [`authorize`]; lists what would have been accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
  "access denied: role '{role}' cannot access this resource, which requires one of [{}]",
  join_roles(.required)
)]
pub struct AccessDenied {
  pub role:     Role,
  pub required: Vec<Role>,
}

fn join_roles(roles: &[Role]) -> String {
  roles
    .iter()
    .map(|r| r.as_str())
    .collect::<Vec<_>>()
    .join(", ")
}

pub fn authorize(role: Role, accepted: &[Role]) -> Result<(), AccessDenied> {
  if accepted.iter().any(|&required| role.satisfies(required)) {
    Ok(())
  } else {
    Err(AccessDenied {
      role,
      required: accepted.to_vec(),
    })
  }
}
