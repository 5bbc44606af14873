use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

use super::validator::ValidationErrors;

pub const MIN_PASSWORD_BYTES: usize = 8;
pub const MAX_PASSWORD_BYTES: usize = 72;

/// A user's password hash, plus the plaintext while it is being set.
///
/// The hash is an argon2 PHC string stored as opaque bytes.
#[derive(Clone, Default)]
pub struct Password {
    plaintext: Option<String>,
    hash: Vec<u8>,
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(..)")
    }
}

impl Password {
    pub fn set(plaintext: &str) -> anyhow::Result<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(Self {
            plaintext: Some(plaintext.to_string()),
            hash: hash.into_bytes(),
        })
    }

    pub fn from_hash(hash: Vec<u8>) -> Self {
        Self {
            plaintext: None,
            hash,
        }
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    pub fn matches(&self, plaintext: &str) -> anyhow::Result<bool> {
        let encoded = std::str::from_utf8(&self.hash)?;
        let parsed = PasswordHash::new(encoded).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }

    pub(crate) fn validate(&self, v: &mut ValidationErrors) {
        if let Some(plaintext) = &self.plaintext {
            v.check(!plaintext.is_empty(), "password", "must be provided");
            v.check(
                plaintext.len() >= MIN_PASSWORD_BYTES,
                "password",
                "must be at least 8 bytes long",
            );
            v.check(
                plaintext.len() <= MAX_PASSWORD_BYTES,
                "password",
                "must not be more than 72 bytes long",
            );
        }
        v.check(!self.hash.is_empty(), "password", "missing password hash");
    }
}
