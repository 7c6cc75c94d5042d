use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::error::{Error, HtmlError};
use crate::database::schema::{User, Uuid};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JwtSessionData {
    pub user_id: Uuid,
    pub email: String,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Uuid, email: String, lifetime: Duration) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: id,
            email,
            iat,
            exp,
        }
    }

    pub fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// Signs and verifies session tokens with a shared HMAC key.
#[derive(Clone)]
pub struct SessionKeys {
    key: Hmac<Sha256>,
    lifetime: Duration,
}

impl SessionKeys {
    pub fn new(secret: &[u8], lifetime: Duration) -> Result<Self, Error> {
        let key = Hmac::new_from_slice(secret)
            .map_err(|_| HtmlError::InternalServerError.new("Invalid session key"))?;

        Ok(Self { key, lifetime })
    }

    pub fn generate_jwt_session(&self, user: &User) -> Result<String, Error> {
        let claims = JwtSessionData::new(user.id, user.email.to_owned(), self.lifetime);

        claims
            .sign_with_key(&self.key)
            .map_err(|e| HtmlError::InternalServerError.new(&format!("Failed to sign token: {e}")))
    }

    pub fn verify_jwt_session(&self, token: &str) -> Result<JwtSessionData, Error> {
        let session: JwtSessionData = token
            .verify_with_key(&self.key)
            .map_err(|_| HtmlError::Unauthorized.new("Invalid token."))?;

        let now = Local::now().timestamp();
        if (session.exp - now).is_negative() {
            return Err(HtmlError::Unauthorized.new("Token has expired."));
        }

        Ok(session)
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            email: String::from("user@example.com"),
            name: String::new(),
            password: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
        }
    }

    #[test]
    fn token_round_trips() {
        let keys = SessionKeys::new(b"secret", Duration::hours(1)).unwrap();
        let token = keys.generate_jwt_session(&user()).unwrap();
        let session = keys.verify_jwt_session(&token).unwrap();

        assert_eq!(session.user_id, 7);
        assert_eq!(session.email, "user@example.com");
        assert!(session.expires_at() > Local::now().timestamp());
    }

    #[test]
    fn token_signed_with_other_key_is_rejected() {
        let keys = SessionKeys::new(b"secret", Duration::hours(1)).unwrap();
        let other = SessionKeys::new(b"other", Duration::hours(1)).unwrap();
        let token = other.generate_jwt_session(&user()).unwrap();

        assert_eq!(keys.verify_jwt_session(&token).unwrap_err().code, 401);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = SessionKeys::new(b"secret", Duration::hours(-1)).unwrap();
        let token = keys.generate_jwt_session(&user()).unwrap();

        let error = keys.verify_jwt_session(&token).unwrap_err();
        assert_eq!(error.code, 401);
        assert_eq!(error.info.as_deref(), Some("Token has expired."));
    }

    #[test]
    fn garbage_is_rejected() {
        let keys = SessionKeys::new(b"secret", Duration::hours(1)).unwrap();
        assert!(keys.verify_jwt_session("not.a.token").is_err());
    }
}
