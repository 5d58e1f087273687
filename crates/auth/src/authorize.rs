use std::str::FromStr;

use thiserror::Error;

use warden_core::UserId;

use crate::Role;
use crate::policy::{PolicyError, PolicyView};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("invalid permission format '{0}'")]
    InvalidRequirement(String),

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("policy unavailable: {0}")]
    PolicyUnavailable(#[from] PolicyError),
}

/// One way of deciding whether a subject satisfies a route requirement.
pub trait AuthorizationStrategy {
    fn permits(&self, policy: &dyn PolicyView, subject: &str) -> Result<bool, PolicyError>;
}

/// `object:action`, decided by the enforcer's rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCheck {
    pub object: String,
    pub action: String,
}

impl AuthorizationStrategy for PermissionCheck {
    fn permits(&self, policy: &dyn PolicyView, subject: &str) -> Result<bool, PolicyError> {
        policy.enforce(subject, &self.object, &self.action)
    }
}

/// Bare role name, satisfied by a direct or inherited role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMembership {
    pub role: Role,
}

impl AuthorizationStrategy for RoleMembership {
    fn permits(&self, policy: &dyn PolicyView, subject: &str) -> Result<bool, PolicyError> {
        Ok(policy.implicit_roles_for_user(subject)?.contains(&self.role))
    }
}

/// A route's required permission, parsed once at route setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Permission(PermissionCheck),
    Role(RoleMembership),
}

impl Requirement {
    pub fn strategy(&self) -> &dyn AuthorizationStrategy {
        match self {
            Requirement::Permission(check) => check,
            Requirement::Role(membership) => membership,
        }
    }
}

impl FromStr for Requirement {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AuthzError::InvalidRequirement(s.to_owned());
        match s.split_once(':') {
            Some((object, action)) => {
                if object.is_empty() || action.is_empty() || action.contains(':') {
                    return Err(invalid());
                }
                Ok(Requirement::Permission(PermissionCheck {
                    object: object.to_owned(),
                    action: action.to_owned(),
                }))
            }
            None if s.is_empty() => Err(invalid()),
            None => Ok(Requirement::Role(RoleMembership {
                role: Role::new(s.to_owned()),
            })),
        }
    }
}

impl core::fmt::Display for Requirement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Requirement::Permission(check) => write!(f, "{}:{}", check.object, check.action),
            Requirement::Role(membership) => write!(f, "{}", membership.role),
        }
    }
}

/// Authorize `subject` for `permission`.
///
/// - No IO
/// - No panics
/// - Every failure (bad format, policy error, no match) is an `Err`
pub fn authorize(policy: &dyn PolicyView, subject: &str, permission: &str) -> Result<(), AuthzError> {
    let requirement: Requirement = permission.parse()?;
    authorize_requirement(policy, subject, &requirement)
}

pub fn authorize_requirement(
    policy: &dyn PolicyView,
    subject: &str,
    requirement: &Requirement,
) -> Result<(), AuthzError> {
    if requirement.strategy().permits(policy, subject)? {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(requirement.to_string()))
    }
}

/// Owners pass without a policy lookup; anyone else needs `permission`.
pub fn authorize_owner_or(
    policy: &dyn PolicyView,
    caller: UserId,
    subject: &str,
    target: UserId,
    permission: &str,
) -> Result<(), AuthzError> {
    if caller == target {
        return Ok(());
    }
    authorize(policy, subject, permission)
}
