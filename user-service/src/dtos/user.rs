use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::UserResponse;
use crate::utils::validation::{validate_password_strength, validate_person_name};

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

/// Body of `PUT /api/users/:id`. Every field is optional; `username` is
/// accepted only so it can be rejected explicitly.
#[derive(Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[schema(example = json!(null))]
    pub username: Option<String>,

    #[validate(
        email(message = "Invalid email format"),
        length(max = 120, message = "Email cannot exceed 120 characters")
    )]
    pub email: Option<String>,

    #[validate(custom(function = "validate_person_name"))]
    pub first_name: Option<String>,

    #[validate(custom(function = "validate_person_name"))]
    pub last_name: Option<String>,

    #[validate(custom(function = "validate_password_strength"))]
    pub password: Option<String>,
}

impl fmt::Debug for UpdateUserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateUserRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl UpdateUserRequest {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.password.is_none()
    }
}

/// Query string of `GET /api/users`.
#[derive(Debug, Clone, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUsersQuery {
    /// 1-based page number (default 1)
    #[validate(range(min = 1, message = "Page number must be greater than 0"))]
    pub page: Option<u32>,

    /// Items per page (default 10, max 100)
    #[validate(range(min = 1, max = 100, message = "Items per page must be between 1 and 100"))]
    pub per_page: Option<u32>,

    /// Case-insensitive substring of username or email
    pub search: Option<String>,
}

impl ListUsersQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE)
    }

    /// Trimmed search term, `None` when blank.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32, total: u64) -> Self {
        let per_page_u64 = u64::from(per_page.max(1));
        let pages = total.div_ceil(per_page_u64);
        Self {
            page,
            per_page,
            total,
            pages,
            has_next: u64::from(page) < pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserEnvelope {
    pub user: UserResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserMessageResponse {
    pub message: String,
    pub user: UserResponse,
}
