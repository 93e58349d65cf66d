//! Argon2 password hashing for the network console password.

use argon2::Argon2;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

/// Hash `password` into a PHC string using `argon2`'s parameters.
pub fn hash_password(argon2: &Argon2<'_>, password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
}

/// `Ok(false)` on mismatch; `Err` only when `stored` is not a valid PHC string.
pub fn verify_password(
    argon2: &Argon2<'_>,
    password: &str,
    stored: &str,
) -> Result<bool, password_hash::Error> {
    let parsed = PasswordHash::new(stored)?;
    Ok(argon2.verify_password(password.as_bytes(), &parsed).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::{Algorithm, Params, Version};

    fn light() -> Argon2<'static> {
        Argon2::new(
            Algorithm::Argon2id,
            Version::V0x13,
            Params::new(1024, 1, 1, None).unwrap(),
        )
    }

    #[test]
    fn hash_then_verify() {
        let a = light();
        let phc = hash_password(&a, "correct horse").unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(verify_password(&a, "correct horse", &phc).unwrap());
        assert!(!verify_password(&a, "correct horse ", &phc).unwrap());
        assert!(verify_password(&a, "x", "not-a-phc-string").is_err());
    }
}
