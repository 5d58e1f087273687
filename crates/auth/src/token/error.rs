use thiserror::Error;

use super::payload::WindowError;

/// Classified token failure.
///
/// Messages never echo token contents or key material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("secret key must be at least {min} bytes, got {actual}")]
    InvalidKey { min: usize, actual: usize },

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has expired or is not yet valid")]
    Expired,

    #[error("failed to parse token claims: {0}")]
    FailedParseClaims(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("token engine failure: {0}")]
    Server(String),
}

impl TokenError {
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

impl From<WindowError> for TokenError {
    fn from(_: WindowError) -> Self {
        TokenError::Expired
    }
}
