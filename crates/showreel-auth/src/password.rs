use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),

    #[error("stored password hash is malformed: {0}")]
    MalformedHash(argon2::password_hash::Error),
}

/// Hash a raw password with Argon2id and a fresh random salt.
///
/// Call exactly once per password mutation, before the row is written.
/// The returned PHC string embeds the salt and parameters, so two calls
/// with the same input never produce the same output.
pub fn hash_password(raw: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(raw.as_bytes(), &salt)
        .map_err(AuthError::Hash)?
        .to_string();
    Ok(hash)
}

/// Check a raw password against a stored PHC string.
///
/// A wrong password is `Ok(false)`, never an error. A stored hash that
/// cannot be parsed is an infrastructure error: that row should not exist.
pub fn verify_password(raw: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(AuthError::MalformedHash)?;

    match Argon2::default().verify_password(raw.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Hash(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verify_roundtrip() {
        let hash = hash_password("Secr3t!").unwrap();
        assert_ne!(hash, "Secr3t!");
        assert!(verify_password("Secr3t!", &hash).unwrap());
    }

    #[test]
    fn wrong_password_is_false_not_error() {
        let hash = hash_password("Secr3t!").unwrap();
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn same_password_hashes_differently() {
        let a = hash_password("repeat-me").unwrap();
        let b = hash_password("repeat-me").unwrap();
        assert_ne!(a, b);

        // Both still verify despite distinct salts.
        assert!(verify_password("repeat-me", &a).unwrap());
        assert!(verify_password("repeat-me", &b).unwrap());
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }
}
