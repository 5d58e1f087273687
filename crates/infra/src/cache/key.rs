//! Deterministic cache keys derived from query shape.
//!
//! Layout: `resource:family` then `:name[value]` for every non-empty
//! parameter, in the order the builder receives them. Values escape `\`, `[`
//! and `]`, so distinct parameter tuples never collide.

use core::fmt::Display;

use warden_core::PageSpec;

/// Namespace of the managed user entity.
pub const USERS_NAMESPACE: &str = "users";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    buf: String,
}

impl CacheKey {
    pub fn new(resource: &str, family: &str) -> Self {
        Self {
            buf: format!("{resource}:{family}"),
        }
    }

    /// Append `:name[value]`; an empty rendering is skipped.
    pub fn param(mut self, name: &str, value: impl Display) -> Self {
        let rendered = value.to_string();
        if rendered.is_empty() {
            return self;
        }
        self.buf.push(':');
        self.buf.push_str(name);
        self.buf.push('[');
        for ch in rendered.chars() {
            if matches!(ch, '\\' | '[' | ']') {
                self.buf.push('\\');
            }
            self.buf.push(ch);
        }
        self.buf.push(']');
        self
    }

    pub fn param_opt(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.param(name, v),
            None => self,
        }
    }

    pub fn build(self) -> String {
        self.buf
    }

    /// Glob matching every key of `resource`.
    pub fn namespace_pattern(resource: &str) -> String {
        format!("{resource}:*")
    }
}

/// Key of one list page, e.g. `users:all:size[10]:after[<id>]`.
pub fn users_list_key(page: &PageSpec) -> String {
    CacheKey::new(USERS_NAMESPACE, "all")
        .param("size", page.size)
        .param_opt("before", page.before_cursor())
        .param_opt("after", page.after_cursor())
        .build()
}
