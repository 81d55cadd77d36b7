//! crates/unveil_core/src/validation.rs
//!
//! Input checks that run before any remote call is made.

use std::sync::OnceLock;

use regex::Regex;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Username must be 3-20 characters: letters, numbers or underscores")]
    InvalidUsername,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Password must be at least {MIN_PASSWORD_LEN} characters")]
    PasswordTooShort,
    #[error("Passwords do not match")]
    PasswordMismatch,
}

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]{3,20}$").expect("valid username pattern"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"))
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username_pattern().is_match(username) {
        Ok(())
    } else {
        Err(ValidationError::InvalidUsername)
    }
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email_pattern().is_match(email.trim()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

pub fn validate_password(password: &str, confirmation: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    if password != confirmation {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}
