//! Messages the account flows hand to downstream systems.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A reset-password token was minted for `email`; a mailer delivers it.
    PasswordResetRequested {
        user_id: UserId,
        email: String,
        token: String,
        expires_at: DateTime<Utc>,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::PasswordResetRequested { .. } => "password_reset_requested",
        }
    }
}
