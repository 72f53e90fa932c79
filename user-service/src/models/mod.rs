pub mod token;
pub mod user;

pub use token::{BlacklistEntry, Claims, CredentialPair, TokenKind};
pub use user::{User, UserResponse};
