//! Cursor pagination over user ids.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::UserId;

/// One page request: `size` rows after/before optional id cursors, ordered
/// by id ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageSpec {
    pub size: u32,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
}

impl PageSpec {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            before: None,
            after: None,
        }
    }

    pub fn before(mut self, cursor: impl Into<String>) -> Self {
        self.before = Some(cursor.into());
        self
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    /// Empty cursors count as absent.
    pub fn before_cursor(&self) -> Option<&str> {
        self.before.as_deref().filter(|c| !c.is_empty())
    }

    pub fn after_cursor(&self) -> Option<&str> {
        self.after.as_deref().filter(|c| !c.is_empty())
    }

    /// Parsed cursors, `(before, after)`.
    pub fn cursors(&self) -> DomainResult<(Option<UserId>, Option<UserId>)> {
        let before = self.before_cursor().map(str::parse).transpose()?;
        let after = self.after_cursor().map(str::parse).transpose()?;
        Ok((before, after))
    }

    pub fn total_pages(&self, total: u64) -> DomainResult<u64> {
        if self.size == 0 {
            return Err(DomainError::validation("page size must be positive"));
        }
        Ok(total.div_ceil(u64::from(self.size)))
    }

    /// Query string reproducing this page; empty cursors are left out and
    /// present ones are percent-encoded.
    pub fn self_link(&self) -> String {
        let mut link = format!("?size={}", self.size);
        if let Some(before) = self.before_cursor() {
            link.push_str("&before=");
            link.push_str(&urlencoding::encode(before));
        }
        if let Some(after) = self.after_cursor() {
            link.push_str("&after=");
            link.push_str(&urlencoding::encode(after));
        }
        link
    }
}
