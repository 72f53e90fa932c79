//! User model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// User entity as persisted by a [`crate::services::UserStore`].
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        username: String,
        email: String,
        password_hash: String,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            first_name,
            last_name,
            is_active: true,
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Public view. The email is only exposed to the account owner.
    pub fn to_response(&self, include_email: bool) -> UserResponse {
        UserResponse {
            id: self.id,
            username: self.username.clone(),
            email: include_email.then(|| self.email.clone()),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            is_active: self.is_active,
            is_admin: self.is_admin.then_some(true),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// User response for API (never carries the password hash).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    #[schema(example = "jdoe")]
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "jdoe@example.com")]
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> User {
        User::new(
            "jdoe".to_string(),
            "jdoe@example.com".to_string(),
            "$argon2id$stub".to_string(),
            Some("John".to_string()),
            None,
        )
    }

    #[test]
    fn new_users_are_active_non_admins() {
        let user = sample();
        assert!(user.is_active);
        assert!(!user.is_admin);
        assert_eq!(user.created_at, user.updated_at);
    }

    #[test]
    fn response_hides_email_and_hash_unless_owner() {
        let user = sample();

        let public = serde_json::to_value(user.to_response(false)).unwrap();
        assert!(public.get("email").is_none());
        assert!(public.get("password_hash").is_none());
        assert!(public.get("is_admin").is_none());

        let own = serde_json::to_value(user.to_response(true)).unwrap();
        assert_eq!(own["email"], "jdoe@example.com");
    }
}
