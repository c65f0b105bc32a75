use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;

use super::AuthError;
use crate::config::AuthConfig;

/// Hash a password into an Argon2 PHC string
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Check a password against an Argon2 PHC string
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// The single account allowed to log in
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password_hash: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
        }
    }

    /// Build from configuration; a plain password is hashed here
    ///
    /// Returns `None` when no password is configured.
    pub fn from_config(config: &AuthConfig) -> Result<Option<Self>, AuthError> {
        if let Some(hash) = config.password_hash.as_deref().filter(|h| !h.is_empty()) {
            PasswordHash::new(hash).map_err(|e| AuthError::Hash(e.to_string()))?;
            return Ok(Some(Self::new(&config.username, hash)));
        }
        match config.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => Ok(Some(Self::new(&config.username, hash_password(password)?))),
            None => Ok(None),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Check a login; the password hash is verified even for a wrong username
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let password_ok = verify_password(password, &self.password_hash);
        password_ok && username == self.username
    }
}
