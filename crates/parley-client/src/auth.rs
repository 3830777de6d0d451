use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use serde_json::{Map, Value};
use tracing::{info, warn};

use parley_gateway::DocumentStore;
use parley_types::api::{SessionProfile, SignInRequest, SignUpRequest};
use parley_types::keys;
use parley_types::models::Document;
use parley_types::query::Query;

use crate::error::ClientError;
use crate::prefs::PreferenceStore;
use crate::view::decode_profile_image;

const MIN_PASSWORD_LEN: usize = 6;

/// Create an account and sign it in.
pub async fn sign_up(
    store: &dyn DocumentStore,
    prefs: &dyn PreferenceStore,
    req: SignUpRequest,
) -> Result<SessionProfile, ClientError> {
    validate_sign_up(&req)?;

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ClientError::PasswordHash(e.to_string()))?
        .to_string();

    let mut fields = Map::new();
    fields.insert(keys::FIRST_NAME.into(), Value::from(req.first_name.trim()));
    fields.insert(keys::LAST_NAME.into(), Value::from(req.last_name.trim()));
    fields.insert(keys::EMAIL.into(), Value::from(req.email.trim()));
    fields.insert(keys::PASSWORD.into(), Value::from(password_hash));
    fields.insert(keys::IMAGE.into(), Value::from(req.image.trim()));

    let doc = store
        .add_unique(keys::COLLECTION_USERS, keys::EMAIL, Value::from(req.email.trim()), fields)
        .await?
        .ok_or(ClientError::EmailTaken)?;
    info!(user_id = %doc.id, "Account created");

    remember_session(prefs, &doc)
}

/// Check credentials and remember the signed-in user.
pub async fn sign_in(
    store: &dyn DocumentStore,
    prefs: &dyn PreferenceStore,
    req: SignInRequest,
) -> Result<SessionProfile, ClientError> {
    validate_sign_in(&req)?;

    let matches = store
        .query(&Query::collection(keys::COLLECTION_USERS).where_eq(keys::EMAIL, req.email.trim()))
        .await?;
    let Some(doc) = matches.first() else {
        return Err(ClientError::InvalidCredentials);
    };

    let stored = doc.get_str(keys::PASSWORD).ok_or(ClientError::InvalidCredentials)?;
    let parsed = PasswordHash::new(stored).map_err(|e| {
        warn!(user_id = %doc.id, "Unreadable password hash: {}", e);
        ClientError::InvalidCredentials
    })?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed)
        .map_err(|_| ClientError::InvalidCredentials)?;

    let profile = remember_session(prefs, doc)?;
    info!(user_id = %profile.user_id, "Signed in");
    Ok(profile)
}

/// Forget the push token on the server, then the local session. If the
/// server update fails the user stays signed in.
pub async fn sign_out(
    store: &dyn DocumentStore,
    prefs: &dyn PreferenceStore,
) -> Result<(), ClientError> {
    let user_id = current_user_id(prefs)?;

    store
        .delete_field(keys::COLLECTION_USERS, &user_id, keys::FCM_TOKEN)
        .await
        .inspect_err(|e| warn!(%user_id, "Unable to sign out: {}", e))?;

    prefs.clear()?;
    info!(%user_id, "Signed out");
    Ok(())
}

pub fn current_user_id(prefs: &dyn PreferenceStore) -> Result<String, ClientError> {
    if !prefs.get_bool(keys::IS_SIGNED_IN) {
        return Err(ClientError::NotSignedIn);
    }
    prefs.get_string(keys::USER_ID).ok_or(ClientError::NotSignedIn)
}

pub fn current_profile(prefs: &dyn PreferenceStore) -> Result<SessionProfile, ClientError> {
    Ok(SessionProfile {
        user_id: current_user_id(prefs)?,
        first_name: prefs.get_string(keys::FIRST_NAME).unwrap_or_default(),
        last_name: prefs.get_string(keys::LAST_NAME).unwrap_or_default(),
        image: prefs.get_string(keys::IMAGE).unwrap_or_default(),
    })
}

fn remember_session(
    prefs: &dyn PreferenceStore,
    doc: &Document,
) -> Result<SessionProfile, ClientError> {
    let profile = SessionProfile {
        user_id: doc.id.clone(),
        first_name: doc.get_str(keys::FIRST_NAME).unwrap_or_default().to_string(),
        last_name: doc.get_str(keys::LAST_NAME).unwrap_or_default().to_string(),
        image: doc.get_str(keys::IMAGE).unwrap_or_default().to_string(),
    };

    prefs.put_bool(keys::IS_SIGNED_IN, true)?;
    prefs.put_string(keys::USER_ID, &profile.user_id)?;
    prefs.put_string(keys::FIRST_NAME, &profile.first_name)?;
    prefs.put_string(keys::LAST_NAME, &profile.last_name)?;
    prefs.put_string(keys::IMAGE, &profile.image)?;

    Ok(profile)
}

// -- Validation --

pub fn validate_sign_in(req: &SignInRequest) -> Result<(), ClientError> {
    validate_email(&req.email)?;
    if req.password.trim().is_empty() {
        return Err(ClientError::Validation("Please enter your password"));
    }
    Ok(())
}

pub fn validate_sign_up(req: &SignUpRequest) -> Result<(), ClientError> {
    if req.first_name.trim().is_empty() {
        return Err(ClientError::Validation("Please enter your first name"));
    }
    if req.last_name.trim().is_empty() {
        return Err(ClientError::Validation("Please enter your last name"));
    }
    validate_email(&req.email)?;
    if req.password.trim().is_empty() {
        return Err(ClientError::Validation("Please enter your password"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ClientError::Validation("Password must be at least 6 characters"));
    }
    if decode_profile_image(&req.image).is_none() {
        return Err(ClientError::Validation("Select profile image"));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ClientError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ClientError::Validation("Please enter your email"));
    }
    if !is_valid_email(email) {
        return Err(ClientError::Validation("Please enter a valid email"));
    }
    Ok(())
}

/// `local@domain.tld`, no whitespace, exactly one `@`.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !host.starts_with('.') && tld.len() >= 2,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPreferences;
    use parley_gateway::LiveStore;

    fn sign_up_request(email: &str) -> SignUpRequest {
        SignUpRequest {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: email.into(),
            password: "analytical".into(),
            image: "aGk=".into(),
        }
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("ada@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.org"));
        assert!(!is_valid_email("ada"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada@.com"));
        assert!(!is_valid_email("ada@@example.com"));
        assert!(!is_valid_email("ada @example.com"));
    }

    #[test]
    fn sign_in_validation_messages() {
        let check = |email: &str, password: &str| {
            validate_sign_in(&SignInRequest {
                email: email.into(),
                password: password.into(),
            })
            .unwrap_err()
            .to_string()
        };
        assert_eq!(check("  ", "x"), "Please enter your email");
        assert_eq!(check("nope", "x"), "Please enter a valid email");
        assert_eq!(check("ada@example.com", " "), "Please enter your password");
    }

    #[test]
    fn sign_up_rejects_bad_image_and_short_password() {
        let mut req = sign_up_request("ada@example.com");
        req.image = "%%%".into();
        assert_eq!(validate_sign_up(&req).unwrap_err().to_string(), "Select profile image");

        let mut req = sign_up_request("ada@example.com");
        req.password = "abc".into();
        assert!(matches!(validate_sign_up(&req), Err(ClientError::Validation(_))));
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let store = LiveStore::in_memory().unwrap();
        let prefs = MemoryPreferences::new();

        let created = sign_up(&store, &prefs, sign_up_request("ada@example.com"))
            .await
            .unwrap();
        assert_eq!(current_user_id(&prefs).unwrap(), created.user_id);

        // The stored password is a hash, not the plaintext
        let doc = store
            .get(keys::COLLECTION_USERS, &created.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(doc.get_str(keys::PASSWORD), Some("analytical"));

        let fresh = MemoryPreferences::new();
        let profile = sign_in(
            &store,
            &fresh,
            SignInRequest {
                email: "ada@example.com".into(),
                password: "analytical".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(profile, created);
        assert_eq!(current_profile(&fresh).unwrap().first_name, "Ada");
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = LiveStore::in_memory().unwrap();
        let prefs = MemoryPreferences::new();
        sign_up(&store, &prefs, sign_up_request("ada@example.com")).await.unwrap();

        let err = sign_up(&store, &prefs, sign_up_request("ada@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::EmailTaken));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_sign_ups_create_one_account() {
        let store = LiveStore::in_memory().unwrap();
        let (a_prefs, b_prefs) = (MemoryPreferences::new(), MemoryPreferences::new());

        let (a, b) = tokio::join!(
            sign_up(&store, &a_prefs, sign_up_request("ada@example.com")),
            sign_up(&store, &b_prefs, sign_up_request("ada@example.com")),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert!(matches!(a.err().or(b.err()), Some(ClientError::EmailTaken)));

        let accounts = store
            .query(&Query::collection(keys::COLLECTION_USERS).where_eq(keys::EMAIL, "ada@example.com"))
            .await
            .unwrap();
        assert_eq!(accounts.len(), 1);
    }

    #[tokio::test]
    async fn wrong_password_or_unknown_email_fails() {
        let store = LiveStore::in_memory().unwrap();
        sign_up(&store, &MemoryPreferences::new(), sign_up_request("ada@example.com"))
            .await
            .unwrap();

        let prefs = MemoryPreferences::new();
        for (email, password) in [("ada@example.com", "wrong-password"), ("bob@example.com", "analytical")] {
            let err = sign_in(
                &store,
                &prefs,
                SignInRequest {
                    email: email.into(),
                    password: password.into(),
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ClientError::InvalidCredentials));
        }
        assert!(matches!(current_user_id(&prefs), Err(ClientError::NotSignedIn)));
    }

    #[tokio::test]
    async fn sign_out_clears_token_and_session() {
        let store = LiveStore::in_memory().unwrap();
        let prefs = MemoryPreferences::new();
        let profile = sign_up(&store, &prefs, sign_up_request("ada@example.com"))
            .await
            .unwrap();
        store
            .update_field(keys::COLLECTION_USERS, &profile.user_id, keys::FCM_TOKEN, "tok".into())
            .await
            .unwrap();

        sign_out(&store, &prefs).await.unwrap();

        let doc = store
            .get(keys::COLLECTION_USERS, &profile.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.get_str(keys::FCM_TOKEN), None);
        assert!(matches!(current_user_id(&prefs), Err(ClientError::NotSignedIn)));
    }

    #[tokio::test]
    async fn failed_sign_out_keeps_the_session() {
        let store = LiveStore::in_memory().unwrap();
        let prefs = MemoryPreferences::new();
        prefs.put_bool(keys::IS_SIGNED_IN, true).unwrap();
        prefs.put_string(keys::USER_ID, "deleted-user").unwrap();

        assert!(sign_out(&store, &prefs).await.is_err());
        assert_eq!(current_user_id(&prefs).unwrap(), "deleted-user");
    }
}
