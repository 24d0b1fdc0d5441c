use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use tracing::error;

use crate::error::AuthError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    // Verified against when the email is unknown, so a miss costs as much as a hit.
    static ref DUMMY_HASH: Option<String> = hash_password("lenslock-dummy-password").ok();
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Normalize and validate an email, returning the canonical form.
pub fn validated_email(email: &str) -> Result<String, AuthError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(AuthError::InvalidInput("Invalid email".into()));
    }
    Ok(email)
}

pub fn validate_password(plain: &str) -> Result<(), AuthError> {
    let len = plain.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AuthError::InvalidInput("Password too short".into()));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AuthError::InvalidInput("Password too long".into()));
    }
    Ok(())
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Argon2 verification compares digests in constant time.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Burn one verification's worth of time for a login against an unknown email.
pub fn verify_dummy_password(plain: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(plain, hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
    }

    #[test]
    fn dummy_hash_is_available() {
        assert!(DUMMY_HASH.is_some());
        verify_dummy_password("whatever");
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn validated_email_rejects_missing_parts() {
        assert!(validated_email("a@x.com").is_ok());
        for bad in ["not-an-email", "missing-at.example.com", "missing-domain@", ""] {
            assert!(matches!(validated_email(bad), Err(AuthError::InvalidInput(_))));
        }
    }

    #[test]
    fn validate_password_enforces_bounds() {
        assert!(validate_password("Secret123!").is_ok());
        assert!(matches!(validate_password(""), Err(AuthError::InvalidInput(_))));
        assert!(matches!(validate_password("short"), Err(AuthError::InvalidInput(_))));
        let long = "x".repeat(MAX_PASSWORD_LEN + 1);
        assert!(matches!(validate_password(&long), Err(AuthError::InvalidInput(_))));
    }

    #[test]
    fn validate_password_counts_characters_not_bytes() {
        let wide = "密".repeat(MAX_PASSWORD_LEN);
        assert!(wide.len() > MAX_PASSWORD_LEN);
        assert!(validate_password(&wide).is_ok());
        assert!(validate_password(&"é".repeat(MIN_PASSWORD_LEN)).is_ok());
        assert!(validate_password(&"é".repeat(MIN_PASSWORD_LEN - 1)).is_err());
        assert!(validate_password(&"密".repeat(MAX_PASSWORD_LEN + 1)).is_err());
    }
}
