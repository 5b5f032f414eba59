//! One-way storage form for refresh tokens and login passwords.
//!
//! Refresh tokens are never stored as-is. The transport-encoded token is
//! reduced to a SHA-256 digest first, so tokens of any length fit the slow
//! hash input, and that digest is then hashed with salted Argon2id. Only the
//! resulting PHC string is persisted.

use crate::token::Error;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Version,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

pub use argon2::Params as HashParams;

#[derive(Debug, Clone, Default)]
pub struct SecretHasher {
    params: HashParams,
}

impl SecretHasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_params(params: HashParams) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a transport-encoded refresh token for storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hash`] if Argon2 fails.
    pub fn hash(&self, encoded_refresh: &str) -> Result<String, Error> {
        let digest = Sha256::digest(encoded_refresh.as_bytes());
        self.hash_bytes(&digest)
    }

    /// Check a presented transport-encoded refresh token against its stored hash.
    ///
    /// Returns `false` on mismatch and on a stored value that is not a valid PHC string.
    #[must_use]
    pub fn compare(&self, stored: &str, presented_refresh: &str) -> bool {
        let digest = Sha256::digest(presented_refresh.as_bytes());
        self.verify_bytes(stored, &digest)
    }

    /// Hash a login password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hash`] if Argon2 fails.
    pub fn hash_password(&self, password: &str) -> Result<String, Error> {
        self.hash_bytes(password.as_bytes())
    }

    #[must_use]
    pub fn verify_password(&self, stored: &str, password: &str) -> bool {
        self.verify_bytes(stored, password.as_bytes())
    }

    fn hash_bytes(&self, input: &[u8]) -> Result<String, Error> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(input, &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| Error::Hash)
    }

    fn verify_bytes(&self, stored: &str, input: &[u8]) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        self.argon2().verify_password(input, &parsed).is_ok()
    }
}
