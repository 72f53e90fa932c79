use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{CredentialPair, UserResponse};
use crate::utils::validation::{
    validate_password_strength, validate_person_name, validate_username,
};

/// Body of `POST /api/auth/register` and `POST /api/users`.
#[derive(Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(custom(function = "validate_username"))]
    #[schema(example = "jdoe")]
    pub username: String,

    #[validate(
        email(message = "Invalid email format"),
        length(max = 120, message = "Email cannot exceed 120 characters")
    )]
    #[schema(example = "jdoe@example.com")]
    pub email: String,

    #[validate(custom(function = "validate_password_strength"))]
    #[schema(example = "Abcdefg1!", min_length = 8)]
    pub password: String,

    #[validate(custom(function = "validate_person_name"))]
    #[schema(example = "John")]
    pub first_name: Option<String>,

    #[validate(custom(function = "validate_person_name"))]
    #[schema(example = "Doe")]
    pub last_name: Option<String>,
}

/// Body of `POST /api/auth/login`. `username` also accepts the account email.
#[derive(Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    #[schema(example = "jdoe")]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "Abcdefg1!")]
    pub password: String,
}

const REDACTED: &str = "***";

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &REDACTED)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

/// Optional body of `POST /api/auth/logout`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LogoutRequest {
    /// Also revoke this refresh token
    pub refresh_token: Option<String>,
}

/// Returned by register and login.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    #[schema(example = "Login successful")]
    pub message: String,
    pub user: UserResponse,
    #[serde(flatten)]
    pub tokens: CredentialPair,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: UserResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RegisterRequest {
        RegisterRequest {
            username: "jdoe".to_string(),
            email: "jdoe@example.com".to_string(),
            password: "Abcdefg1!".to_string(),
            first_name: Some("John".to_string()),
            last_name: None,
        }
    }

    #[test]
    fn register_request_accepts_valid_input() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn register_request_reports_each_bad_field() {
        let req = RegisterRequest {
            username: "1x".to_string(),
            email: "invalid-email".to_string(),
            password: "abc".to_string(),
            first_name: Some("R2D2".to_string()),
            last_name: None,
        };
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        for field in ["username", "email", "password", "first_name"] {
            assert!(
                fields.keys().any(|k| k.to_string() == field),
                "missing error for {field}"
            );
        }
    }

    #[test]
    fn login_request_requires_both_fields() {
        let req = LoginRequest {
            username: String::new(),
            password: "x".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn debug_output_hides_passwords() {
        let register = format!("{:?}", valid());
        assert!(register.contains("jdoe"));
        assert!(!register.contains("Abcdefg1!"));

        let login = format!(
            "{:?}",
            LoginRequest {
                username: "jdoe".to_string(),
                password: "Abcdefg1!".to_string(),
            }
        );
        assert!(login.contains("jdoe"));
        assert!(!login.contains("Abcdefg1!"));
    }
}
