//! Classified errors returned by the orchestration layer.
//!
//! Backend failures are classified into an [`ErrorKind`] at the boundary.
//! Raw messages go to the log; callers only ever see a fixed detail sentence.

use core::fmt::Display;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use warden_auth::{AuthzError, PasswordError, PolicyError, TokenError};
use warden_core::DomainError;
use warden_events::PublishError;
use warden_infra::{CacheError, DeadlineExceeded, Scoped, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    RequestTimeout,
    Conflict,
    UnprocessableEntity,
    InternalServerError,
}

impl ErrorKind {
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::RequestTimeout => 408,
            ErrorKind::Conflict => 409,
            ErrorKind::UnprocessableEntity => 422,
            ErrorKind::InternalServerError => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::UnprocessableEntity => "UNPROCESSABLE_ENTITY",
            ErrorKind::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "the request could not be understood",
            ErrorKind::Unauthorized => "authentication is required",
            ErrorKind::Forbidden => "access to the resource is forbidden",
            ErrorKind::NotFound => "resource not found",
            ErrorKind::RequestTimeout => "request timed out",
            ErrorKind::Conflict => "resource already exists",
            ErrorKind::UnprocessableEntity => "the request could not be processed",
            ErrorKind::InternalServerError => "internal server error",
        }
    }
}

/// One entry of an error response: `{title, status, code, detail}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{title}: {detail}")]
pub struct AppError {
    #[serde(skip)]
    pub kind: ErrorKind,
    pub title: String,
    pub status: u16,
    pub code: &'static str,
    pub detail: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            title: kind.code().to_owned(),
            status: kind.status(),
            code: kind.code(),
            detail: detail.into(),
        }
    }

    /// A field-level validation failure.
    pub fn validation(detail: impl Into<String>) -> Self {
        Self {
            title: "Validation Error".to_owned(),
            ..Self::new(ErrorKind::UnprocessableEntity, detail)
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, detail)
    }
}

/// Every error a single call produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{} error(s), first: {}", errors.len(), first_detail(errors))]
pub struct ErrorSet {
    pub errors: Vec<AppError>,
}

fn first_detail(errors: &[AppError]) -> &str {
    errors.first().map(|e| e.detail.as_str()).unwrap_or("none")
}

impl ErrorSet {
    pub fn new(errors: Vec<AppError>) -> Self {
        Self { errors }
    }

    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.errors.iter().map(|e| e.kind).collect()
    }

    /// Kind of the first entry; the transport answers with its status.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.errors.first().map(|e| e.kind)
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == Some(kind)
    }
}

impl From<AppError> for ErrorSet {
    fn from(err: AppError) -> Self {
        Self { errors: vec![err] }
    }
}

// -------------------------
// Classification
// -------------------------

/// Maps a layer error onto the taxonomy.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

impl Classify for DomainError {
    fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) | DomainError::InvalidId(_) => ErrorKind::UnprocessableEntity,
            DomainError::NotFound => ErrorKind::NotFound,
            DomainError::Conflict(_) => ErrorKind::Conflict,
        }
    }
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound => ErrorKind::NotFound,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::InvalidFilter(_)
            | StoreError::InvalidPage(_)
            | StoreError::Database(_) => ErrorKind::InternalServerError,
        }
    }
}

impl Classify for CacheError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::InternalServerError
    }
}

impl Classify for TokenError {
    fn kind(&self) -> ErrorKind {
        match self {
            TokenError::Malformed(_) | TokenError::SignatureInvalid => ErrorKind::BadRequest,
            TokenError::Expired => ErrorKind::Forbidden,
            TokenError::InvalidKey { .. } | TokenError::FailedParseClaims(_) => {
                ErrorKind::UnprocessableEntity
            }
            TokenError::InvalidPayload(_) | TokenError::Server(_) => ErrorKind::InternalServerError,
        }
    }
}

/// The route guard fails closed: every authorization error is a denial.
impl Classify for AuthzError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Forbidden
    }
}

impl Classify for PolicyError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::InternalServerError
    }
}

impl Classify for PasswordError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::InternalServerError
    }
}

impl Classify for PublishError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::InternalServerError
    }
}

impl Classify for DeadlineExceeded {
    fn kind(&self) -> ErrorKind {
        ErrorKind::RequestTimeout
    }
}

impl<E: Classify> Classify for Scoped<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Scoped::Timeout(exceeded) => exceeded.kind(),
            Scoped::Failed(err) => err.kind(),
        }
    }
}

/// Log `err` with its raw message and turn it into a response entry.
///
/// `context` names the step that failed, e.g. `"count users"`.
pub fn classify<E>(context: &'static str, err: E) -> AppError
where
    E: Classify + Display,
{
    let kind = err.kind();
    match kind {
        ErrorKind::InternalServerError | ErrorKind::RequestTimeout => {
            error!(context, code = kind.code(), error = %err, "request step failed");
        }
        _ => warn!(context, code = kind.code(), error = %err, "request step rejected"),
    }
    AppError::new(kind, format!("{context}: {}", kind.summary()))
}
