use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_core::UserId;

/// Identity carried inside every token.
///
/// Never persisted on its own: it is built at issuance, sealed into a token,
/// and reconstructed by verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub id: UserId,
    pub email: String,
    pub issued_at: DateTime<Utc>,
    #[serde(rename = "expired_at")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WindowError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

impl Payload {
    /// Payload valid from now for `ttl`.
    pub fn new(id: UserId, email: impl Into<String>, ttl: Duration) -> Self {
        Self::issued_at(id, email, Utc::now(), ttl)
    }

    pub fn issued_at(id: UserId, email: impl Into<String>, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id,
            email: email.into(),
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    /// Structural check only: the window must be non-empty.
    ///
    /// Zero-value timestamps collapse the window and fail here.
    pub fn check_window(&self) -> Result<(), WindowError> {
        if self.expires_at <= self.issued_at {
            return Err(WindowError::InvalidTimeWindow);
        }
        Ok(())
    }

    /// Full validity check at `now`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), WindowError> {
        self.check_window()?;
        if now < self.issued_at {
            return Err(WindowError::NotYetValid);
        }
        if now >= self.expires_at {
            return Err(WindowError::Expired);
        }
        Ok(())
    }

    /// Expiry as unix milliseconds, the shape responses expose.
    pub fn expires_at_millis(&self) -> i64 {
        self.expires_at.timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn validates_inside_window() {
        let p = Payload::issued_at(UserId::new(), "a@b.com", now(), Duration::minutes(5));
        assert_eq!(p.validate(now() + Duration::minutes(1)), Ok(()));
    }

    #[test]
    fn expires_at_boundary() {
        let p = Payload::issued_at(UserId::new(), "a@b.com", now(), Duration::minutes(5));
        assert_eq!(p.validate(p.expires_at), Err(WindowError::Expired));
    }

    #[test]
    fn rejects_future_issue() {
        let p = Payload::issued_at(UserId::new(), "a@b.com", now(), Duration::minutes(5));
        assert_eq!(
            p.validate(now() - Duration::seconds(1)),
            Err(WindowError::NotYetValid)
        );
    }

    #[test]
    fn zero_timestamps_are_never_valid() {
        let p = Payload {
            id: UserId::new(),
            email: "a@b.com".into(),
            issued_at: DateTime::<Utc>::UNIX_EPOCH,
            expires_at: DateTime::<Utc>::UNIX_EPOCH,
        };
        assert_eq!(p.check_window(), Err(WindowError::InvalidTimeWindow));
        assert!(p.validate(now()).is_err());
    }

    #[test]
    fn serializes_with_wire_names() {
        let p = Payload::issued_at(UserId::new(), "a@b.com", now(), Duration::minutes(5));
        let json = serde_json::to_value(&p).unwrap();
        assert!(json.get("expired_at").is_some());
        assert!(json.get("issued_at").is_some());
        assert!(json.get("expires_at").is_none());
    }
}
