use std::fmt;
use std::sync::Arc;

use super::error::TokenError;

/// Shortest secret any token class accepts.
pub const MIN_SECRET_KEY_LEN: usize = 32;

/// Token classes. Each is bound to its own key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenClass {
    Access,
    Refresh,
    ResetPassword,
}

impl TokenClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenClass::Access => "access",
            TokenClass::Refresh => "refresh",
            TokenClass::ResetPassword => "reset_password",
        }
    }
}

/// Raw signing/encryption secret.
///
/// Neither `Serialize` nor a revealing `Debug`: key bytes only leave through
/// [`SecretKey::expose`], which is crate-private.
#[derive(Clone)]
pub struct SecretKey(Arc<[u8]>);

impl SecretKey {
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        Self(Arc::from(bytes.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ensure_min_len(&self) -> Result<(), TokenError> {
        if self.0.len() < MIN_SECRET_KEY_LEN {
            return Err(TokenError::InvalidKey {
                min: MIN_SECRET_KEY_LEN,
                actual: self.0.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(<redacted>, {} bytes)", self.0.len())
    }
}

/// The three per-class secrets, loaded once at startup.
#[derive(Clone)]
pub struct SecretKeySet {
    access: SecretKey,
    refresh: SecretKey,
    reset: SecretKey,
}

impl SecretKeySet {
    /// Fails closed if any key is undersized.
    pub fn new(access: SecretKey, refresh: SecretKey, reset: SecretKey) -> Result<Self, TokenError> {
        access.ensure_min_len()?;
        refresh.ensure_min_len()?;
        reset.ensure_min_len()?;
        Ok(Self {
            access,
            refresh,
            reset,
        })
    }

    pub fn key(&self, class: TokenClass) -> &SecretKey {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
            TokenClass::ResetPassword => &self.reset,
        }
    }
}

impl fmt::Debug for SecretKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeySet").finish_non_exhaustive()
    }
}
