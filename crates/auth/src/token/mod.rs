//! Token engine: issue and verify time-bounded bearer tokens.
//!
//! Two interchangeable backends implement [`TokenEngine`]:
//!
//! - [`JwtEngine`]: HS256-signed claims.
//! - [`AeadEngine`]: XChaCha20-Poly1305 sealed payloads.
//!
//! Both are pure functions of `(key, payload)` and `(key, token)`, and both
//! re-check the embedded expiry inside verification: a verified payload is
//! always inside its validity window.

mod aead;
mod error;
mod jwt;
mod keys;
mod payload;

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use warden_core::UserId;

pub use aead::AeadEngine;
pub use error::TokenError;
pub use jwt::JwtEngine;
pub use keys::{MIN_SECRET_KEY_LEN, SecretKey, SecretKeySet, TokenClass};
pub use payload::{Payload, WindowError};

/// Which backend a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScheme {
    Jwt,
    #[serde(alias = "paseto")]
    Aead,
}

impl FromStr for TokenScheme {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jwt" => Ok(TokenScheme::Jwt),
            "aead" | "paseto" => Ok(TokenScheme::Aead),
            other => Err(TokenError::server(format!("unknown token scheme '{other}'"))),
        }
    }
}

/// A token backend.
///
/// Callers pick the key for the class they mean to verify; engines never
/// detect the class themselves.
pub trait TokenEngine: Send + Sync + std::fmt::Debug {
    fn scheme(&self) -> TokenScheme;

    fn create_payload(&self, id: UserId, email: &str, ttl: Duration) -> Payload {
        Payload::new(id, email, ttl)
    }

    fn create_token(&self, key: &SecretKey, payload: &Payload) -> Result<String, TokenError>;

    fn verify_token(&self, key: &SecretKey, token: &str) -> Result<Payload, TokenError>;
}

pub(crate) fn check_issuable(key: &SecretKey, payload: &Payload) -> Result<(), TokenError> {
    key.ensure_min_len()?;
    payload
        .check_window()
        .map_err(|e| TokenError::InvalidPayload(e.to_string()))
}

pub(crate) fn check_fresh(payload: Payload, now: DateTime<Utc>) -> Result<Payload, TokenError> {
    payload.validate(now)?;
    Ok(payload)
}

/// Build the engine for `scheme`.
pub fn engine_for(scheme: TokenScheme, issuer: impl Into<String>) -> Arc<dyn TokenEngine> {
    match scheme {
        TokenScheme::Jwt => Arc::new(JwtEngine::new(issuer)),
        TokenScheme::Aead => Arc::new(AeadEngine::new()),
    }
}

/// Token lifetimes per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTtls {
    pub access: Duration,
    pub refresh: Duration,
    pub reset: Duration,
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self {
            access: Duration::minutes(5),
            refresh: Duration::days(7),
            reset: Duration::minutes(15),
        }
    }
}

impl TokenTtls {
    pub fn for_class(&self, class: TokenClass) -> Duration {
        match class {
            TokenClass::Access => self.access,
            TokenClass::Refresh => self.refresh,
            TokenClass::ResetPassword => self.reset,
        }
    }
}

/// A freshly minted token and the payload sealed inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub payload: Payload,
}

/// Engine bound to its key set: the only holder of secrets at runtime.
#[derive(Debug, Clone)]
pub struct Tokens {
    engine: Arc<dyn TokenEngine>,
    keys: Arc<SecretKeySet>,
    ttls: TokenTtls,
}

impl Tokens {
    pub fn new(engine: Arc<dyn TokenEngine>, keys: SecretKeySet, ttls: TokenTtls) -> Self {
        Self {
            engine,
            keys: Arc::new(keys),
            ttls,
        }
    }

    pub fn scheme(&self) -> TokenScheme {
        self.engine.scheme()
    }

    pub fn ttls(&self) -> &TokenTtls {
        &self.ttls
    }

    pub fn issue(&self, class: TokenClass, id: UserId, email: &str) -> Result<IssuedToken, TokenError> {
        let payload = self
            .engine
            .create_payload(id, email, self.ttls.for_class(class));
        let token = self.engine.create_token(self.keys.key(class), &payload)?;
        Ok(IssuedToken { token, payload })
    }

    pub fn verify(&self, class: TokenClass, token: &str) -> Result<Payload, TokenError> {
        self.engine.verify_token(self.keys.key(class), token)
    }
}
