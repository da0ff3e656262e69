//! Password hashing and verification on top of the bcrypt primitive.

use crate::error::{Error, Result};

/// Length of a marshalled bcrypt hash.
pub const HASH_LEN: usize = 60;

/// Hashes a plaintext password.
pub fn hash_password(plain: &str) -> Result<String> {
    bcrypt::hash(plain, bcrypt::DEFAULT_COST).map_err(|_| Error::InvalidPassword)
}

/// Verifies a plaintext password against a stored hash in constant time.
pub fn verify_password(plain: &str, hash: &str) -> Result<()> {
    match bcrypt::verify(plain, hash) {
        Ok(true) => Ok(()),
        _ => Err(Error::InvalidPassword),
    }
}

/// Validates the fixed 60-byte bcrypt hash format of a loaded credential.
pub fn check_hash_format(hash: &str) -> Result<()> {
    if hash.len() != HASH_LEN || !hash.starts_with("$2") {
        return Err(Error::InvalidPassword);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("hunter2").unwrap();
        assert_eq!(hash.len(), HASH_LEN);
        assert!(verify_password("hunter2", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong", &hash),
            Err(Error::InvalidPassword)
        ));
    }

    #[test]
    fn test_hash_format_check() {
        let hash = hash_password("pw").unwrap();
        assert!(check_hash_format(&hash).is_ok());
        assert!(matches!(check_hash_format("short"), Err(Error::InvalidPassword)));
        assert!(matches!(
            check_hash_format(&"x".repeat(HASH_LEN)),
            Err(Error::InvalidPassword)
        ));
    }
}
