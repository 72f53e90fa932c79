use chrono::Utc;
use secrecy::ExposeSecret;
use std::sync::Arc;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::config::AdminBootstrapConfig;
use crate::dtos::auth::RegisterRequest;
use crate::dtos::user::{ListUsersQuery, Pagination, UpdateUserRequest};
use crate::models::User;
use crate::services::user_store::{UserStore, EMAIL_TAKEN, USERNAME_TAKEN};
use crate::services::ServiceError;
use crate::utils::{hash_password, Password};

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn hash(password: String) -> Result<String, ServiceError> {
    hash_password(&Password::new(password))
        .map(|h| h.into_string())
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))
}

/// Validate, check uniqueness, hash and persist a new account.
pub(crate) async fn create_account(
    users: &dyn UserStore,
    req: RegisterRequest,
    is_admin: bool,
) -> Result<User, ServiceError> {
    req.validate()?;

    if users.find_by_username(&req.username).await?.is_some() {
        return Err(ServiceError::Conflict(USERNAME_TAKEN.to_string()));
    }
    if users.find_by_email(&req.email).await?.is_some() {
        return Err(ServiceError::Conflict(EMAIL_TAKEN.to_string()));
    }

    let mut user = User::new(
        req.username,
        req.email,
        hash(req.password)?,
        non_blank(req.first_name),
        non_blank(req.last_name),
    );
    user.is_admin = is_admin;

    // The store re-checks uniqueness, so a racing duplicate still fails here.
    users.insert(&user).await?;

    Ok(user)
}

/// User CRUD with owner-only mutation.
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn list(
        &self,
        query: &ListUsersQuery,
    ) -> Result<(Vec<User>, Pagination), ServiceError> {
        query.validate()?;

        let (page, per_page) = (query.page(), query.per_page());
        let result = self
            .users
            .list_active(page, per_page, query.search_term())
            .await?;

        Ok((result.users, Pagination::new(page, per_page, result.total)))
    }

    /// Active user by id.
    pub async fn get(&self, id: Uuid) -> Result<User, ServiceError> {
        self.users
            .find_by_id(id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ServiceError::UserNotFound)
    }

    pub async fn create(&self, req: RegisterRequest) -> Result<User, ServiceError> {
        let user = create_account(self.users.as_ref(), req, false).await?;
        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }

    pub async fn update(
        &self,
        requester_id: Uuid,
        id: Uuid,
        req: UpdateUserRequest,
    ) -> Result<User, ServiceError> {
        if requester_id != id {
            return Err(ServiceError::Forbidden(
                "Not authorized to modify this user".to_string(),
            ));
        }

        let mut user = self.get(id).await?;

        if req.username.is_some() {
            let mut errors = ValidationErrors::new();
            errors.add(
                "username",
                ValidationError::new("immutable").with_message("Username cannot be changed".into()),
            );
            return Err(ServiceError::Validation(errors));
        }
        if req.is_empty() {
            return Err(ServiceError::BadRequest("No data provided".to_string()));
        }
        req.validate()?;

        if let Some(email) = req.email {
            if !email.eq_ignore_ascii_case(&user.email) {
                if let Some(other) = self.users.find_by_email(&email).await? {
                    if other.id != user.id {
                        return Err(ServiceError::Conflict(EMAIL_TAKEN.to_string()));
                    }
                }
            }
            user.email = email;
        }
        if let Some(first_name) = req.first_name {
            user.first_name = non_blank(Some(first_name));
        }
        if let Some(last_name) = req.last_name {
            user.last_name = non_blank(Some(last_name));
        }
        let password_changed = req.password.is_some();
        if let Some(password) = req.password {
            user.password_hash = hash(password)?;
        }
        user.updated_at = Utc::now();

        self.users.update(&user).await?;

        tracing::info!(user_id = %user.id, password_changed, "User updated");
        Ok(user)
    }

    /// Soft delete: the row stays, `is_active` goes false.
    pub async fn deactivate(&self, requester_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        if requester_id != id {
            return Err(ServiceError::Forbidden(
                "Not authorized to delete this user".to_string(),
            ));
        }

        let mut user = self.get(id).await?;
        user.is_active = false;
        user.updated_at = Utc::now();
        self.users.update(&user).await?;

        tracing::info!(user_id = %user.id, "User deactivated");
        Ok(())
    }

    /// Create the configured admin account unless the username is already taken.
    /// Returns whether an account was created.
    pub async fn ensure_admin(&self, admin: &AdminBootstrapConfig) -> Result<bool, ServiceError> {
        if let Some(existing) = self.users.find_by_username(&admin.username).await? {
            tracing::info!(user_id = %existing.id, "Admin user already exists");
            return Ok(false);
        }

        let req = RegisterRequest {
            username: admin.username.clone(),
            email: admin.email.clone(),
            password: admin.password.expose_secret().clone(),
            first_name: None,
            last_name: None,
        };
        let user = create_account(self.users.as_ref(), req, true).await?;

        tracing::info!(user_id = %user.id, "Admin user created");
        Ok(true)
    }
}
