//! Batched request validation.
//!
//! Checks accumulate into one [`Validator`]; [`Validator::finish`] reports
//! every violated field at once.

use warden_core::{PageSpec, UserId};

use crate::errors::{AppError, ErrorSet};

pub const EMAIL_MAX_LEN: usize = 254;

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<AppError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    fn violation(&mut self, field: &str, tag: &str, message: &str) {
        self.errors.push(violation(field, tag, message));
    }

    /// Non-empty. Returns whether the value was present so dependent checks
    /// can be skipped.
    pub fn required(&mut self, field: &str, value: &str) -> bool {
        if value.is_empty() {
            self.violation(field, "required", "is a required field");
            return false;
        }
        true
    }

    pub fn min_len(&mut self, field: &str, value: &str, min: usize) -> &mut Self {
        if value.chars().count() < min {
            self.violation(field, &format!("min={min}"), &format!("must be at least {min} characters"));
        }
        self
    }

    pub fn max_len(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        if value.chars().count() > max {
            self.violation(field, &format!("max={max}"), &format!("must be at most {max} characters"));
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if !is_email(value) {
            self.violation(field, "email", "must be a valid email address");
        }
        self
    }

    pub fn eq_field(&mut self, field: &str, value: &str, other_field: &str, other: &str) -> &mut Self {
        if value != other {
            self.violation(
                field,
                &format!("eqfield={other_field}"),
                &format!("must be equal to {other_field}"),
            );
        }
        self
    }

    pub fn positive(&mut self, field: &str, value: u32) -> &mut Self {
        if value == 0 {
            self.violation(field, "gt=0", "must be greater than 0");
        }
        self
    }

    /// Parse `value` as a user id, recording a violation on failure.
    pub fn user_id(&mut self, field: &str, value: &str) -> Option<UserId> {
        match parse_user_id(field, value) {
            Ok(id) => Some(id),
            Err(set) => {
                self.errors.extend(set.errors);
                None
            }
        }
    }

    /// Required email of bounded length.
    pub fn required_email(&mut self, field: &str, value: &str) -> &mut Self {
        if self.required(field, value) {
            self.email(field, value).max_len(field, value, EMAIL_MAX_LEN);
        }
        self
    }

    pub fn page(&mut self, page: &PageSpec) -> &mut Self {
        self.positive("size", page.size);
        if let Some(before) = page.before_cursor() {
            self.user_id("before", before);
        }
        if let Some(after) = page.after_cursor() {
            self.user_id("after", after);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), ErrorSet> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ErrorSet::new(self.errors))
        }
    }

    /// Finish, folding in a value parsed ahead of the other checks. Its
    /// violations are reported first.
    pub fn finish_with<T>(self, parsed: Result<T, ErrorSet>) -> Result<T, ErrorSet> {
        match parsed {
            Ok(value) => self.finish().map(|()| value),
            Err(set) => {
                let mut errors = set.errors;
                errors.extend(self.errors);
                Err(ErrorSet::new(errors))
            }
        }
    }
}

/// Structural email check: one `@`, a non-empty local part, and a dotted
/// domain without empty labels. No whitespace anywhere.
pub fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| !label.is_empty())
}

fn violation(field: &str, tag: &str, message: &str) -> AppError {
    AppError::validation(format!("Field '{field}' with tag '{tag}': {message}"))
}

/// Validate a path id on its own.
pub fn parse_user_id(field: &str, value: &str) -> Result<UserId, ErrorSet> {
    value
        .parse::<UserId>()
        .map_err(|_| violation(field, "uuid", "must be a valid UUID").into())
}
