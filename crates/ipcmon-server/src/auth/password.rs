//! Argon2id hashing for account passwords and one-time confirmation codes.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

pub type HashError = argon2::password_hash::Error;

/// Hash a secret using argon2id with a random salt.
pub fn hash_secret(secret: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Check a secret against a stored PHC hash string. A malformed stored hash
/// is an error; a mismatch is `Ok(false)`.
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, HashError> {
    let parsed = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn numeric_codes_hash_and_verify() {
        let hash = hash_secret("042917").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret("042917", &hash).unwrap());
        assert!(!verify_secret("42917", &hash).unwrap());
    }

    #[test]
    fn same_secret_gets_a_fresh_salt() {
        assert_ne!(hash_secret("hunter2").unwrap(), hash_secret("hunter2").unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_secret("x", "not-a-phc-string").is_err());
    }
}
