use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use super::model::{Grouping, PolicyRule, PolicySnapshot};
use crate::roles::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy store error: {0}")]
    Store(String),

    #[error("policy state poisoned")]
    Poisoned,
}

/// Persisted grant/rule relation behind the enforcer.
///
/// `replace_roles` must be atomic: either every old grouping of the subject is
/// gone and the new set is present, or nothing changed.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn load_policy(&self) -> Result<PolicySnapshot, PolicyError>;

    async fn add_policy(&self, rule: &PolicyRule) -> Result<(), PolicyError>;

    async fn remove_policy(&self, rule: &PolicyRule) -> Result<(), PolicyError>;

    async fn add_grouping(&self, subject: &str, role: &Role) -> Result<(), PolicyError>;

    async fn remove_grouping(&self, subject: &str, role: &Role) -> Result<(), PolicyError>;

    async fn replace_roles(&self, subject: &str, roles: &[Role]) -> Result<(), PolicyError>;
}

#[async_trait]
impl<S> PolicyStore for Arc<S>
where
    S: PolicyStore + ?Sized,
{
    async fn load_policy(&self) -> Result<PolicySnapshot, PolicyError> {
        (**self).load_policy().await
    }

    async fn add_policy(&self, rule: &PolicyRule) -> Result<(), PolicyError> {
        (**self).add_policy(rule).await
    }

    async fn remove_policy(&self, rule: &PolicyRule) -> Result<(), PolicyError> {
        (**self).remove_policy(rule).await
    }

    async fn add_grouping(&self, subject: &str, role: &Role) -> Result<(), PolicyError> {
        (**self).add_grouping(subject, role).await
    }

    async fn remove_grouping(&self, subject: &str, role: &Role) -> Result<(), PolicyError> {
        (**self).remove_grouping(subject, role).await
    }

    async fn replace_roles(&self, subject: &str, roles: &[Role]) -> Result<(), PolicyError> {
        (**self).replace_roles(subject, roles).await
    }
}

/// In-memory policy store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    inner: RwLock<PolicySnapshot>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: PolicySnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut PolicySnapshot) -> T) -> Result<T, PolicyError> {
        let mut guard = self.inner.write().map_err(|_| PolicyError::Poisoned)?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn load_policy(&self) -> Result<PolicySnapshot, PolicyError> {
        let guard = self.inner.read().map_err(|_| PolicyError::Poisoned)?;
        Ok(guard.clone())
    }

    async fn add_policy(&self, rule: &PolicyRule) -> Result<(), PolicyError> {
        self.write(|s| {
            if !s.rules.contains(rule) {
                s.rules.push(rule.clone());
            }
        })
    }

    async fn remove_policy(&self, rule: &PolicyRule) -> Result<(), PolicyError> {
        self.write(|s| s.rules.retain(|r| r != rule))
    }

    async fn add_grouping(&self, subject: &str, role: &Role) -> Result<(), PolicyError> {
        let grouping = Grouping::new(subject, role.clone());
        self.write(|s| {
            if !s.groupings.contains(&grouping) {
                s.groupings.push(grouping);
            }
        })
    }

    async fn remove_grouping(&self, subject: &str, role: &Role) -> Result<(), PolicyError> {
        self.write(|s| {
            s.groupings
                .retain(|g| !(g.subject == subject && &g.role == role))
        })
    }

    async fn replace_roles(&self, subject: &str, roles: &[Role]) -> Result<(), PolicyError> {
        self.write(|s| {
            s.groupings.retain(|g| g.subject != subject);
            s.groupings
                .extend(roles.iter().map(|r| Grouping::new(subject, r.clone())));
        })
    }
}
