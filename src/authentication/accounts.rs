use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{EMAIL_MAX_LENGTH, PASSWORD_MIN_LENGTH, USER_NAME_MAX_LENGTH};
use crate::database::error::{field_error, Error, FieldErrors, HtmlError};
use crate::database::form::{TokenPayload, UserPayload};
use crate::database::schema::{NewUser, User, UserChanges};
use crate::database::store::Store;

use super::cryptography::{hash_password, verify_password};
use super::jwt::SessionKeys;

static EMAIL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@([A-Za-z0-9-]+\.)+[A-Za-z0-9-]{2,}$").ok());

fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .map_or(false, |pattern| pattern.is_match(email))
}

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";
const BAD_CREDENTIALS: &str = "Unable to log in with provided credentials.";

/// Lowercases the domain part of an address. The local part is kept as given.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_owned(),
    }
}

fn check_email(errors: &mut FieldErrors, email: Option<&str>, required: bool) -> Option<String> {
    let email = match email {
        Some(email) => email.trim(),
        None => {
            if required {
                errors.add("email", REQUIRED);
            }
            return None;
        }
    };

    if email.is_empty() {
        errors.add("email", BLANK);
    } else if email.chars().count() > EMAIL_MAX_LENGTH {
        errors.add(
            "email",
            &format!("Ensure this field has no more than {EMAIL_MAX_LENGTH} characters."),
        );
    } else if !is_valid_email(email) {
        errors.add("email", "Enter a valid email address.");
    } else {
        return Some(normalize_email(email));
    }
    None
}

fn check_password(errors: &mut FieldErrors, password: Option<&str>, required: bool) -> Option<String> {
    match password {
        None => {
            if required {
                errors.add("password", REQUIRED);
            }
            None
        }
        Some("") => {
            errors.add("password", BLANK);
            None
        }
        Some(password) if password.chars().count() < PASSWORD_MIN_LENGTH => {
            errors.add(
                "password",
                &format!("Ensure this field has at least {PASSWORD_MIN_LENGTH} characters."),
            );
            None
        }
        Some(password) => Some(password.to_owned()),
    }
}

fn check_name(errors: &mut FieldErrors, name: Option<&str>) -> Option<String> {
    let name = name?.trim();
    if name.chars().count() > USER_NAME_MAX_LENGTH {
        errors.add(
            "name",
            &format!("Ensure this field has no more than {USER_NAME_MAX_LENGTH} characters."),
        );
        return None;
    }
    Some(name.to_owned())
}

fn hash(password: &str) -> Result<String, Error> {
    hash_password(password).map_err(|e| {
        log::error!("Password hashing failed: {e}");
        HtmlError::InternalServerError.default()
    })
}

async fn insert_user(
    store: &dyn Store,
    payload: &UserPayload,
    is_staff: bool,
) -> Result<User, Error> {
    let mut errors = FieldErrors::new();
    let email = check_email(&mut errors, payload.email.as_deref(), true);
    let password = check_password(&mut errors, payload.password.as_deref(), true);
    let name = check_name(&mut errors, payload.name.as_deref());
    errors.finish()?;

    let (email, password) = match (email, password) {
        (Some(email), Some(password)) => (email, password),
        _ => return Err(HtmlError::InvalidRequest.default()),
    };

    let user = NewUser {
        email,
        name: name.unwrap_or_default(),
        password: hash(&password)?,
        is_staff,
        is_superuser: is_staff,
    };

    match store.create_user(user).await? {
        Some(user) => {
            log::info!("Registered user {}", user.id);
            Ok(user)
        }
        None => Err(field_error("email", "user with this email already exists.")),
    }
}

/// Validates and creates a regular account.
pub async fn register_user(store: &dyn Store, payload: &UserPayload) -> Result<User, Error> {
    insert_user(store, payload, false).await
}

/// Creates an account with both the staff and superuser flags set.
pub async fn create_superuser(store: &dyn Store, payload: &UserPayload) -> Result<User, Error> {
    insert_user(store, payload, true).await
}

/// Checks credentials and issues a session token.
pub async fn login_user(
    store: &dyn Store,
    keys: &SessionKeys,
    payload: &TokenPayload,
) -> Result<String, Error> {
    let mut errors = FieldErrors::new();
    match payload.email.as_deref() {
        None => errors.add("email", REQUIRED),
        Some("") => errors.add("email", BLANK),
        _ => (),
    }
    match payload.password.as_deref() {
        None => errors.add("password", REQUIRED),
        Some("") => errors.add("password", BLANK),
        _ => (),
    }
    errors.finish()?;

    let (email, password) = match (&payload.email, &payload.password) {
        (Some(email), Some(password)) => (normalize_email(email), password),
        _ => return Err(HtmlError::InvalidRequest.default()),
    };

    let user = match store.get_user_by_email(&email).await? {
        Some(user) if user.is_active => user,
        _ => return Err(field_error("non_field_errors", BAD_CREDENTIALS)),
    };

    let valid = verify_password(password, &user.password).map_err(|e| {
        log::error!("Stored password hash for user {} is unreadable: {e}", user.id);
        HtmlError::InternalServerError.default()
    })?;
    if !valid {
        log::debug!("Rejected login for user {}", user.id);
        return Err(field_error("non_field_errors", BAD_CREDENTIALS));
    }

    keys.generate_jwt_session(&user)
}

/// Updates the acting user's own account. A full update requires email and password.
pub async fn update_profile(
    store: &dyn Store,
    user: &User,
    payload: &UserPayload,
    partial: bool,
) -> Result<User, Error> {
    let mut errors = FieldErrors::new();
    let email = check_email(&mut errors, payload.email.as_deref(), !partial);
    let password = check_password(&mut errors, payload.password.as_deref(), !partial);
    let name = check_name(&mut errors, payload.name.as_deref());
    errors.finish()?;

    let changes = UserChanges {
        email,
        name,
        password: match password {
            Some(password) => Some(hash(&password)?),
            None => None,
        },
    };

    match store.update_user(user.id, changes).await? {
        Some(user) => Ok(user),
        None => Err(field_error("email", "user with this email already exists.")),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::database::memory::MemoryStore;

    fn payload(email: &str, password: &str) -> UserPayload {
        UserPayload {
            email: Some(email.to_owned()),
            password: Some(password.to_owned()),
            name: Some("Test Name".to_owned()),
        }
    }

    fn keys() -> SessionKeys {
        SessionKeys::new(b"test-secret", Duration::hours(1)).unwrap()
    }

    #[test]
    fn emails_are_normalized_on_the_domain_only() {
        let samples = [
            ("test1@EXAMPLE.com", "test1@example.com"),
            ("Test2@Example.com", "Test2@example.com"),
            ("TEST3@EXAMPLE.COM", "TEST3@example.com"),
            ("test4@example.COM", "test4@example.com"),
        ];

        for (given, expected) in samples {
            assert_eq!(normalize_email(given), expected);
        }
    }

    #[tokio::test]
    async fn register_hashes_the_password() {
        let store = MemoryStore::new();
        let user = register_user(&store, &payload("test@example.com", "testpass123"))
            .await
            .unwrap();

        assert_eq!(user.email, "test@example.com");
        assert_ne!(user.password, "testpass123");
        assert!(verify_password("testpass123", &user.password).unwrap());
        assert!(!user.is_staff);
        assert!(!user.is_superuser);
    }

    #[tokio::test]
    async fn register_rejects_blank_email() {
        let store = MemoryStore::new();
        let error = register_user(&store, &payload("", "testpass123"))
            .await
            .unwrap_err();

        assert_eq!(error.code, 400);
        assert!(error.fields.contains_key("email"));
    }

    #[tokio::test]
    async fn register_rejects_short_password() {
        let store = MemoryStore::new();
        let error = register_user(&store, &payload("test@example.com", "pw"))
            .await
            .unwrap_err();

        assert_eq!(error.code, 400);
        assert!(error.fields.contains_key("password"));
        assert!(store.get_user_by_email("test@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let store = MemoryStore::new();
        register_user(&store, &payload("test@example.com", "testpass123"))
            .await
            .unwrap();
        let error = register_user(&store, &payload("test@EXAMPLE.com", "otherpass123"))
            .await
            .unwrap_err();

        assert_eq!(error.code, 400);
        assert!(error.fields.contains_key("email"));
    }

    #[tokio::test]
    async fn superuser_has_both_flags() {
        let store = MemoryStore::new();
        let user = create_superuser(&store, &payload("admin@example.com", "adminpass123"))
            .await
            .unwrap();

        assert!(user.is_staff);
        assert!(user.is_superuser);
    }

    #[tokio::test]
    async fn login_issues_a_verifiable_token() {
        let store = MemoryStore::new();
        let keys = keys();
        let user = register_user(&store, &payload("test@example.com", "testpass123"))
            .await
            .unwrap();

        let token = login_user(
            &store,
            &keys,
            &TokenPayload {
                email: Some("test@example.com".to_owned()),
                password: Some("testpass123".to_owned()),
            },
        )
        .await
        .unwrap();

        assert_eq!(keys.verify_jwt_session(&token).unwrap().user_id, user.id);
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let store = MemoryStore::new();
        register_user(&store, &payload("test@example.com", "testpass123"))
            .await
            .unwrap();

        let error = login_user(
            &store,
            &keys(),
            &TokenPayload {
                email: Some("test@example.com".to_owned()),
                password: Some("wrongpass".to_owned()),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(error.code, 400);
        assert!(error.fields.contains_key("non_field_errors"));
    }

    #[tokio::test]
    async fn login_requires_password() {
        let store = MemoryStore::new();
        let error = login_user(
            &store,
            &keys(),
            &TokenPayload {
                email: Some("test@example.com".to_owned()),
                password: Some(String::new()),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(error.code, 400);
        assert!(error.fields.contains_key("password"));
    }

    #[tokio::test]
    async fn partial_profile_update_keeps_other_fields() {
        let store = MemoryStore::new();
        let user = register_user(&store, &payload("test@example.com", "testpass123"))
            .await
            .unwrap();

        let updated = update_profile(
            &store,
            &user,
            &UserPayload {
                name: Some("Updated name".to_owned()),
                password: Some("newpassword123".to_owned()),
                ..Default::default()
            },
            true,
        )
        .await
        .unwrap();

        assert_eq!(updated.name, "Updated name");
        assert_eq!(updated.email, "test@example.com");
        assert!(verify_password("newpassword123", &updated.password).unwrap());
    }

    #[tokio::test]
    async fn full_profile_update_requires_email() {
        let store = MemoryStore::new();
        let user = register_user(&store, &payload("test@example.com", "testpass123"))
            .await
            .unwrap();

        let error = update_profile(
            &store,
            &user,
            &UserPayload {
                password: Some("newpassword123".to_owned()),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap_err();

        assert!(error.fields.contains_key("email"));
    }
}
