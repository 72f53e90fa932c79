//! Field rules shared by registration, user creation and user updates.

use std::borrow::Cow;
use validator::ValidationError;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 80;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;
pub const NAME_MAX_LEN: usize = 100;
pub const PASSWORD_SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

/// 3–80 ASCII characters, letters/digits/underscore/hyphen, starting with a letter.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if len < USERNAME_MIN_LEN {
        return Err(invalid(
            "username_too_short",
            "Username must be at least 3 characters",
        ));
    }
    if len > USERNAME_MAX_LEN {
        return Err(invalid(
            "username_too_long",
            "Username cannot exceed 80 characters",
        ));
    }
    if !username.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(invalid(
            "username_start",
            "Username must start with a letter",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid(
            "username_charset",
            "Username may only contain letters, digits, hyphens and underscores",
        ));
    }
    Ok(())
}

/// Password policy: 8–128 characters with upper, lower, digit and special.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if len < PASSWORD_MIN_LEN {
        return Err(invalid(
            "password_too_short",
            "Password must be at least 8 characters",
        ));
    }
    if len > PASSWORD_MAX_LEN {
        return Err(invalid(
            "password_too_long",
            "Password cannot exceed 128 characters",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(invalid(
            "password_uppercase",
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(invalid(
            "password_lowercase",
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(invalid(
            "password_digit",
            "Password must contain at least one digit",
        ));
    }
    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        return Err(invalid(
            "password_special",
            "Password must contain at least one special character (!@#$%^&*(),.?\":{}|<>)",
        ));
    }
    Ok(())
}

/// Optional first/last names: letters, spaces, hyphens and apostrophes.
pub fn validate_person_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Ok(());
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(invalid("name_too_long", "Name cannot exceed 100 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '-' || c == '\'')
    {
        return Err(invalid(
            "name_charset",
            "Name may only contain letters, spaces, hyphens and apostrophes",
        ));
    }
    Ok(())
}
