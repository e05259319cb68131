//! Input shape checks shared by the route handlers.

use crate::error::{AppError, FieldError};

pub const QUOTE_TEXT_MAX: usize = 1000;
pub const QUOTE_AUTHOR_MAX: usize = 100;
pub const CATEGORY_MAX: usize = 50;
pub const TAG_MAX: usize = 50;
pub const TAGS_MAX: usize = 20;
pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 30;
pub const PASSWORD_MIN: usize = 6;
pub const QUESTION_MAX: usize = 500;

/// Collects field errors and turns them into a single 400.
#[derive(Debug, Default)]
pub struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Trimmed length must fall within `min..=max` characters.
    pub fn length(&mut self, field: &'static str, value: &str, min: usize, max: usize) {
        let len = value.trim().chars().count();
        if len < min || len > max {
            if min <= 1 {
                self.fail(field, format!("must be between 1 and {max} characters"));
            } else {
                self.fail(field, format!("must be between {min} and {max} characters"));
            }
        }
    }

    pub fn username(&mut self, value: &str) {
        self.length("username", value, USERNAME_MIN, USERNAME_MAX);
        if !is_valid_username(value.trim()) {
            self.fail(
                "username",
                "may contain only letters, digits and underscores",
            );
        }
    }

    pub fn email(&mut self, field: &'static str, value: &str) {
        if !is_valid_email(value.trim()) {
            self.fail(field, "must be a valid email address");
        }
    }

    pub fn password(&mut self, field: &'static str, value: &str) {
        if value.chars().count() < PASSWORD_MIN {
            self.fail(field, format!("must be at least {PASSWORD_MIN} characters"));
        }
        if !is_strong_password(value) {
            self.fail(
                field,
                "must contain a lowercase letter, an uppercase letter and a digit",
            );
        }
    }

    pub fn tags(&mut self, tags: &[String]) {
        if tags.len() > TAGS_MAX {
            self.fail("tags", format!("at most {TAGS_MAX} tags are allowed"));
        }
        if tags
            .iter()
            .any(|t| t.trim().is_empty() || t.chars().count() > TAG_MAX)
        {
            self.fail("tags", format!("each tag must be 1 to {TAG_MAX} characters"));
        }
    }

    /// # Errors
    ///
    /// Returns [`AppError::Validation`] if any check failed.
    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

#[must_use]
pub fn is_valid_username(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Structural check: one `@`, non-empty local part, dotted domain without
/// empty labels and no whitespace.
#[must_use]
pub fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

#[must_use]
pub fn is_strong_password(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_lowercase())
        && value.chars().any(|c| c.is_ascii_uppercase())
        && value.chars().any(|c| c.is_ascii_digit())
}

/// Trim, drop empty and repeated tags, preserving first-seen order.
#[must_use]
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
