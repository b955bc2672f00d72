use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length for an email address (RFC 5321 path limit).
pub const MAX_EMAIL_LENGTH: usize = 254;

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 20;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Upper bound on password length.
///
/// Keeps the slow hash from being fed arbitrarily large inputs.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum length for a subject title.
pub const MAX_TITLE_LENGTH: usize = 255;

// Patterns are compile-time constants; failure here is a programming error
#[allow(clippy::expect_used)]
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+$").expect("EMAIL_REGEX is a valid pattern")
});

#[allow(clippy::expect_used)]
static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("USERNAME_REGEX is a valid pattern"));

/// Validate an email address used as the login identity.
pub fn validate_email(email: &str) -> AppResult<()> {
    if email.is_empty() {
        return Err(AppError::BadRequest("Email cannot be empty".to_string()));
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Email cannot exceed {MAX_EMAIL_LENGTH} characters"
        )));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(AppError::BadRequest("Invalid email format".to_string()));
    }

    Ok(())
}

/// Validate a display username.
///
/// Rules:
/// - Between 3 and 20 characters
/// - ASCII letters, digits and underscores only
pub fn validate_username(username: &str) -> AppResult<()> {
    let len = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&len) {
        return Err(AppError::BadRequest(format!(
            "Username must be between {MIN_USERNAME_LENGTH} and {MAX_USERNAME_LENGTH} characters"
        )));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(AppError::BadRequest(
            "Username may only contain letters, digits and underscores".to_string(),
        ));
    }

    Ok(())
}

/// Validate a new password before hashing.
///
/// Only length is enforced. Content is never echoed back in errors.
pub fn validate_password(password: &str) -> AppResult<()> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    if len > MAX_PASSWORD_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Password cannot exceed {MAX_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Validate a subject title for the catalog.
pub fn validate_title(title: &str) -> AppResult<()> {
    if title.trim().is_empty() {
        return Err(AppError::BadRequest("Title cannot be empty".to_string()));
    }

    if title.len() > MAX_TITLE_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Title cannot exceed {MAX_TITLE_LENGTH} characters"
        )));
    }

    if let Some(pos) = title.chars().position(|c| c.is_control()) {
        return Err(AppError::BadRequest(format!(
            "Title contains invalid control character at position {pos}"
        )));
    }

    Ok(())
}
