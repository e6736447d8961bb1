//! Password hashing and session token issuance/verification.
//!
//! Flow Overview:
//! 1) Passwords are hashed with Argon2id (random salt, fixed default cost) and
//!    stored as PHC strings.
//! 2) Login looks the user up by email and verifies the password on the
//!    blocking pool. Unknown emails are verified against a dummy hash so the
//!    response time does not reveal whether the account exists.
//! 3) Successful logins receive an HS256 token carrying `{id, email, role}` and
//!    a 24 hour expiry, signed with the validated `JWT_SECRET`.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use super::{
    secret::{SecretError, SecretProvider},
    storage::UserStore,
    types::{Identity, Role},
};

pub const TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

// Plaintext for the timing-equalization hash; never matches a stored record.
const DUMMY_PASSWORD: &str = "storefront-unknown-account";

/// Reasons a session token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("token signature mismatch")]
    SignatureMismatch,
    #[error("signing secret unavailable")]
    SecretUnavailable,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error("failed to hash password")]
    Hash,
    #[error("failed to sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
    #[error("user store error: {0}")]
    Store(anyhow::Error),
    #[error("password worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id: i64,
    email: String,
    role: Role,
    iat: i64,
    exp: i64,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// Hash a password with Argon2id and a random salt.
///
/// # Errors
/// Returns `CredentialError::Hash` if the hasher rejects the input.
pub fn hash_password(plaintext: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| CredentialError::Hash)
}

/// Verify a password against a stored PHC hash. Unparsable hashes never match.
#[must_use]
pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        debug!("stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

pub struct CredentialService {
    secrets: Arc<SecretProvider>,
    store: Arc<dyn UserStore>,
    dummy_hash: String,
}

impl CredentialService {
    /// # Errors
    /// Returns an error if the timing-equalization hash cannot be computed.
    pub fn new(
        secrets: Arc<SecretProvider>,
        store: Arc<dyn UserStore>,
    ) -> Result<Self, CredentialError> {
        Ok(Self {
            secrets,
            store,
            dummy_hash: hash_password(DUMMY_PASSWORD)?,
        })
    }

    #[must_use]
    pub fn secrets(&self) -> &SecretProvider {
        &self.secrets
    }

    /// Issue a session token for `identity`, valid for 24 hours.
    ///
    /// # Errors
    /// Returns an error if the signing secret is not configured or signing fails.
    pub fn generate_token(&self, identity: &Identity) -> Result<String, CredentialError> {
        self.generate_token_at(identity, chrono::Utc::now().timestamp())
    }

    fn generate_token_at(
        &self,
        identity: &Identity,
        issued_at: i64,
    ) -> Result<String, CredentialError> {
        let secret = self.secrets.get()?;
        let claims = Claims {
            id: identity.id,
            email: identity.email.clone(),
            role: identity.role,
            iat: issued_at,
            exp: issued_at + TOKEN_TTL_SECONDS,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(CredentialError::Sign)
    }

    /// Verify a token and report why it was rejected.
    ///
    /// # Errors
    /// Returns the `TokenError` describing the failure.
    pub fn decode_token(&self, token: &str) -> Result<Identity, TokenError> {
        let secret = self.secrets.get().map_err(|err| {
            error!("Cannot verify session token: {err}");
            TokenError::SecretUnavailable
        })?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map(|data| data.claims.into())
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::SignatureMismatch,
                _ => TokenError::Malformed,
            })
    }

    /// Verify a token. Every failure collapses to `None`.
    #[must_use]
    pub fn verify_token(&self, token: &str) -> Option<Identity> {
        match self.decode_token(token) {
            Ok(identity) => Some(identity),
            Err(err) => {
                debug!("Session token rejected: {err}");
                None
            }
        }
    }

    /// Check an email/password pair against the user store.
    ///
    /// Returns `Ok(None)` for both unknown emails and wrong passwords.
    ///
    /// # Errors
    /// Returns an error only for store or worker failures.
    pub async fn authenticate_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>, CredentialError> {
        let record = self
            .store
            .find_by_email(email)
            .await
            .map_err(CredentialError::Store)?;

        let (hash, identity) = match record {
            Some(record) => (record.password_hash.clone(), Some(record.identity())),
            None => (self.dummy_hash.clone(), None),
        };

        let password = password.to_string();
        let valid =
            tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?;

        Ok(if valid { identity } else { None })
    }

    /// Create a `user`-role account. Returns `Ok(None)` if the email is taken.
    ///
    /// # Errors
    /// Returns an error if hashing or the store insert fails.
    pub async fn register_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>, CredentialError> {
        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

        let record = self
            .store
            .create_user(email, &hash, Role::User)
            .await
            .map_err(CredentialError::Store)?;

        Ok(record.map(|record| record.identity()))
    }
}

impl std::fmt::Debug for CredentialService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialService")
            .field("secrets", &self.secrets)
            .finish_non_exhaustive()
    }
}
