//! Business logic for user-service: authentication, token lifecycle and
//! user management, over pluggable user and blacklist stores.

mod auth;
pub mod blacklist;
pub mod error;
mod jwt;
pub mod user_store;
mod users;

pub use auth::AuthService;
pub use blacklist::{spawn_purge_task, InMemoryBlacklist, RedisBlacklist, TokenBlacklist};
pub use error::ServiceError;
pub use jwt::{JwtService, JwtSigner, TokenError, TokenSigner};
pub use user_store::{InMemoryUserStore, PgUserStore, StoreError, UserPage, UserStore};
pub use users::UserService;
