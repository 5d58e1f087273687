//! Step-by-step construction of the orchestrators.

use std::sync::Arc;

use thiserror::Error;

use warden_auth::{Enforcer, PasswordHasher, Tokens};
use warden_core::UserView;
use warden_events::{EventBus, Notification};
use warden_infra::{CacheAside, Deadlines, UserStore};

use crate::auth::AuthService;
use crate::users::UsersService;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing dependency: {0}")]
    Missing(&'static str),
}

fn required<T>(value: Option<T>, name: &'static str) -> Result<T, BuildError> {
    value.ok_or(BuildError::Missing(name))
}

#[derive(Default)]
pub struct AuthServiceBuilder {
    users: Option<Arc<dyn UserStore>>,
    enforcer: Option<Arc<Enforcer>>,
    tokens: Option<Tokens>,
    hasher: Option<Arc<dyn PasswordHasher>>,
    bus: Option<Arc<dyn EventBus<Notification>>>,
    cache: Option<CacheAside<UserView>>,
    deadlines: Deadlines,
}

impl AuthServiceBuilder {
    pub fn users(mut self, users: Arc<dyn UserStore>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn enforcer(mut self, enforcer: Arc<Enforcer>) -> Self {
        self.enforcer = Some(enforcer);
        self
    }

    pub fn tokens(mut self, tokens: Tokens) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn bus(mut self, bus: Arc<dyn EventBus<Notification>>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn cache(mut self, cache: CacheAside<UserView>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Defaults to [`Deadlines::default`] when not set.
    pub fn deadlines(mut self, deadlines: Deadlines) -> Self {
        self.deadlines = deadlines;
        self
    }

    pub fn build(self) -> Result<AuthService, BuildError> {
        Ok(AuthService {
            users: required(self.users, "users")?,
            enforcer: required(self.enforcer, "enforcer")?,
            tokens: required(self.tokens, "tokens")?,
            hasher: required(self.hasher, "hasher")?,
            bus: required(self.bus, "bus")?,
            cache: required(self.cache, "cache")?,
            deadlines: self.deadlines,
        })
    }
}

#[derive(Default)]
pub struct UsersServiceBuilder {
    users: Option<Arc<dyn UserStore>>,
    cache: Option<CacheAside<UserView>>,
    hasher: Option<Arc<dyn PasswordHasher>>,
    deadlines: Deadlines,
}

impl UsersServiceBuilder {
    pub fn users(mut self, users: Arc<dyn UserStore>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn cache(mut self, cache: CacheAside<UserView>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn deadlines(mut self, deadlines: Deadlines) -> Self {
        self.deadlines = deadlines;
        self
    }

    pub fn build(self) -> Result<UsersService, BuildError> {
        Ok(UsersService {
            users: required(self.users, "users")?,
            cache: required(self.cache, "cache")?,
            hasher: required(self.hasher, "hasher")?,
            deadlines: self.deadlines,
        })
    }
}
