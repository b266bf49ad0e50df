//! Password hashing with Argon2id
//!
//! Hashes are stored in PHC string format, so the algorithm parameters and
//! salt travel with the hash.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash a password with a fresh random salt.
///
/// ```
/// use portalen::services::password::{hash_password, verify_password};
///
/// let hash = hash_password("hemligt-lösen").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// assert!(verify_password("hemligt-lösen", &hash).unwrap());
/// ```
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
        .context("Password hashing failed")?;

    Ok(hash.to_string())
}

/// Verify a password against a stored hash. A malformed hash is an error,
/// a wrong password is `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))
        .context("Failed to parse password hash")?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
    }
}

/// Length policy shared by registration, admin creation and password change
pub fn check_password_policy(password: &str) -> Result<(), String> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(format!("Lösenordet måste vara minst {} tecken", MIN_PASSWORD_LENGTH));
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(format!("Lösenordet får vara högst {} tecken", MAX_PASSWORD_LENGTH));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashes_are_salted() {
        let hash1 = hash_password("samma-lösenord").expect("Failed to hash password");
        let hash2 = hash_password("samma-lösenord").expect("Failed to hash password");
        assert_ne!(hash1, hash2);
        assert!(!hash1.contains("samma-lösenord"));
    }

    #[test]
    fn test_verify_correct_and_incorrect() {
        let hash = hash_password("rätt-lösenord").unwrap();
        assert!(verify_password("rätt-lösenord", &hash).unwrap());
        assert!(!verify_password("fel-lösenord", &hash).unwrap());
    }

    #[test]
    fn test_verify_invalid_hash_is_error() {
        assert!(verify_password("lösenord", "inte-en-hash").is_err());
    }

    #[test]
    fn test_policy_bounds() {
        assert!(check_password_policy("kort").is_err());
        assert!(check_password_policy("åttatecken").is_ok());
        assert!(check_password_policy(&"a".repeat(129)).is_err());
    }
}
