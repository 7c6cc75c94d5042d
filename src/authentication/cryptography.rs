use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::{distributions::Alphanumeric, Rng};

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    Ok(argon2
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(
    password: &str,
    password_hash: &str,
) -> Result<bool, argon2::password_hash::Error> {
    let argon2 = Argon2::default();
    let parsed_hash = PasswordHash::new(password_hash)?;

    Ok(argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Random alphanumeric string, suitable as a `SECRET_KEY` value.
pub fn generate_secret(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trips_and_is_salted() {
        let first = hash_password("Whatever1").unwrap();
        let second = hash_password("Whatever1").unwrap();

        assert_ne!(first, second);
        assert_ne!(first, "Whatever1");
        assert!(verify_password("Whatever1", &first).unwrap());
        assert!(!verify_password("Whatever2", &first).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("Whatever1", "not-a-hash").is_err());
    }

    #[test]
    fn secret_has_requested_length() {
        assert_eq!(generate_secret(48).len(), 48);
    }
}
