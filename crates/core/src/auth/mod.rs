//! Password authentication.
//!
//! Local accounts store an Argon2id PHC string. Accounts created through
//! single sign-on have no password until one is set.

mod password;

pub use password::{
    MIN_PASSWORD_LENGTH, PasswordError, check_password_change, hash_password, validate_new_password,
    verify_password,
};
