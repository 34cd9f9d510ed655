use anyhow::{Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use tracing::{info, warn};

use crate::Database;
use crate::models::{NewUser, UserRow};

/// Hash a plaintext password with Argon2id and a fresh random salt.
/// The result is a self-describing PHC string suitable for `users.password`.
pub fn hash_password(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| anyhow!("Password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// Check a plaintext password against a stored PHC string.
/// An unparsable stored hash never verifies.
pub fn verify_password(plaintext: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Stored password hash is malformed: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

impl Database {
    /// Register a user: hashes `password` and inserts the row.
    pub fn signup(&self, new: &NewUser, password: &str) -> Result<UserRow> {
        let password_hash = hash_password(password)?;
        self.create_user(new, &password_hash)
    }

    /// Look a user up by username and check their password.
    /// Unknown usernames and wrong passwords both yield `None`.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserRow>> {
        let Some(user) = self.get_user_by_username(username)? else {
            info!(username, "Login failed: unknown user");
            return Ok(None);
        };

        if verify_password(password, &user.password) {
            Ok(Some(user))
        } else {
            info!(username, "Login failed: wrong password");
            Ok(None)
        }
    }
}
