//! `warden-auth`: token issuance, RBAC, and credential hashing.
//!
//! This crate is decoupled from HTTP and from concrete storage: policy
//! persistence comes in through [`PolicyStore`].

pub mod authorize;
pub mod password;
pub mod policy;
pub mod roles;
pub mod token;

pub use authorize::{
    AuthorizationStrategy, AuthzError, PermissionCheck, Requirement, RoleMembership, authorize,
    authorize_owner_or, authorize_requirement,
};
pub use password::{Argon2Hasher, PasswordError, PasswordHasher};
pub use policy::{
    Effect, Enforcer, Grouping, InMemoryPolicyStore, PolicyError, PolicyModel, PolicyRule,
    PolicySnapshot, PolicyStore, PolicyView,
};
pub use roles::Role;
pub use token::{
    AeadEngine, IssuedToken, JwtEngine, Payload, SecretKey, SecretKeySet, TokenClass, TokenEngine,
    TokenError, TokenScheme, TokenTtls, Tokens, engine_for,
};
