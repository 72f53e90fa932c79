pub mod extract;
pub mod password;
pub mod validation;

pub use extract::{AppJson, ValidatedJson, ValidatedQuery};
pub use password::{
    hash_password, verify_against_dummy, verify_password, Password, PasswordHashString,
};
