//! Source-of-truth store for user accounts.
//!
//! Calls carry no deadline argument: callers bound each call with a
//! [`crate::deadline::Deadlines`] scope, and dropping the future cancels it.

mod memory;
mod postgres;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use warden_core::{NewUser, PageSpec, User, UserId, UserPatch};

pub use memory::InMemoryUserStore;
pub use postgres::PostgresUserStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid filter column '{0}'")]
    InvalidFilter(String),

    #[error("invalid page: {0}")]
    InvalidPage(String),

    #[error("database error: {0}")]
    Database(String),
}

/// Columns `exists_by_key_value` may filter on.
pub const FILTERABLE_COLUMNS: [&str; 3] = ["id", "username", "email"];

/// Equality filter over whitelisted columns, ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter(BTreeMap<String, String>);

impl UserFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn email(value: impl Into<String>) -> Self {
        Self::new().with("email", value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        match self.0.keys().find(|k| !FILTERABLE_COLUMNS.contains(&k.as_str())) {
            Some(bad) => Err(StoreError::InvalidFilter(bad.clone())),
            None => Ok(()),
        }
    }
}

/// Persistence contract for the managed entity.
///
/// Reads see active rows only; `restore` is the one call that reaches a
/// soft-deleted row.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Active users ordered by id, honoring the page cursors.
    async fn get_all(&self, page: &PageSpec) -> Result<Vec<User>, StoreError>;

    async fn get_by_id(&self, id: UserId) -> Result<User, StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Fails with `Conflict` when the email is taken.
    async fn create(&self, user: NewUser) -> Result<(), StoreError>;

    async fn update(&self, id: UserId, patch: &UserPatch) -> Result<(), StoreError>;

    /// Soft delete.
    async fn delete(&self, id: UserId) -> Result<(), StoreError>;

    /// `false` when no soft-deleted row with `id` exists.
    async fn restore(&self, id: UserId) -> Result<bool, StoreError>;

    async fn count_by_id(&self, id: UserId) -> Result<u64, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn exists_by_key_value(&self, filter: &UserFilter) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S> UserStore for Arc<S>
where
    S: UserStore + ?Sized,
{
    async fn get_all(&self, page: &PageSpec) -> Result<Vec<User>, StoreError> {
        (**self).get_all(page).await
    }

    async fn get_by_id(&self, id: UserId) -> Result<User, StoreError> {
        (**self).get_by_id(id).await
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        (**self).get_by_email(email).await
    }

    async fn create(&self, user: NewUser) -> Result<(), StoreError> {
        (**self).create(user).await
    }

    async fn update(&self, id: UserId, patch: &UserPatch) -> Result<(), StoreError> {
        (**self).update(id, patch).await
    }

    async fn delete(&self, id: UserId) -> Result<(), StoreError> {
        (**self).delete(id).await
    }

    async fn restore(&self, id: UserId) -> Result<bool, StoreError> {
        (**self).restore(id).await
    }

    async fn count_by_id(&self, id: UserId) -> Result<u64, StoreError> {
        (**self).count_by_id(id).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        (**self).count().await
    }

    async fn exists_by_key_value(&self, filter: &UserFilter) -> Result<bool, StoreError> {
        (**self).exists_by_key_value(filter).await
    }
}
