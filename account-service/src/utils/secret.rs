use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::fmt;

/// Plaintext one-time secret, such as a verification code. Never printed.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Argon2 hash of a [`Secret`] in PHC string format.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretHash(String);

impl SecretHash {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a secret with Argon2id and a random salt.
pub fn hash_secret(secret: &Secret) -> Result<SecretHash, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(secret.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash secret: {}", e))?
        .to_string();

    Ok(SecretHash::new(hash))
}

/// `false` for a wrong secret or an unparseable stored hash.
pub fn verify_secret(secret: &Secret, hash: &SecretHash) -> bool {
    let Ok(parsed) = PasswordHash::new(hash.as_str()) else {
        tracing::warn!("Stored secret hash is not a valid PHC string");
        return false;
    };

    Argon2::default()
        .verify_password(secret.as_str().as_bytes(), &parsed)
        .is_ok()
}
