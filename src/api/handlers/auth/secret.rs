//! Signing secret validation and caching.
//!
//! The secret is read from the environment once, validated, and cached for the
//! lifetime of the process. Changing the variable afterwards has no effect until
//! restart. There is no default value: a missing or short secret is a fatal
//! configuration error.

use once_cell::sync::OnceCell;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use thiserror::Error;
use tracing::info;

pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const MIN_SECRET_LENGTH: usize = 32;

/// Startup configuration errors for the signing secret.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    #[error(
        "{var} environment variable is required; set it to a random string of at least 32 characters"
    )]
    Missing { var: String },
    #[error(
        "{var} must be at least 32 characters long; current length: {length} characters"
    )]
    TooShort { var: String, length: usize },
}

/// A validated signing secret. Construction guarantees the length invariant.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Validate a raw secret value.
    ///
    /// # Errors
    /// Returns `SecretError` if the value is empty or shorter than 32 characters.
    pub fn new(var: &str, value: &str) -> Result<Self, SecretError> {
        if value.is_empty() {
            return Err(SecretError::Missing {
                var: var.to_string(),
            });
        }

        let length = value.chars().count();
        if length < MIN_SECRET_LENGTH {
            return Err(SecretError::TooShort {
                var: var.to_string(),
                length,
            });
        }

        Ok(Self(SecretString::from(value.to_string())))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.expose_secret().as_bytes()
    }
}

impl fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JwtSecret(***)")
    }
}

/// Process-wide provider of the signing secret.
///
/// Built once during startup and shared by handle; concurrent first calls to
/// [`SecretProvider::get`] race on a compute-once cell and all observe the same
/// value.
pub struct SecretProvider {
    var: String,
    cell: OnceCell<JwtSecret>,
}

impl SecretProvider {
    /// Provider reading the `JWT_SECRET` variable.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(JWT_SECRET_ENV)
    }

    /// Provider reading an arbitrary variable name.
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            cell: OnceCell::new(),
        }
    }

    /// Provider that is already initialized with a validated secret.
    #[must_use]
    pub fn with_secret(secret: JwtSecret) -> Self {
        Self {
            var: JWT_SECRET_ENV.to_string(),
            cell: OnceCell::with_value(secret),
        }
    }

    /// Return the validated secret, reading the environment on first use only.
    ///
    /// # Errors
    /// Returns `SecretError` if the variable is absent or too short. Failed
    /// reads are not cached, so a later call will read the environment again.
    pub fn get(&self) -> Result<&JwtSecret, SecretError> {
        self.cell.get_or_try_init(|| {
            let raw = std::env::var(&self.var).unwrap_or_default();
            let secret = JwtSecret::new(&self.var, &raw)?;
            info!(
                target: crate::STARTUP_LOG_TARGET,
                "{} is configured ({} characters)",
                self.var,
                raw.chars().count()
            );
            Ok(secret)
        })
    }

    #[must_use]
    pub fn var(&self) -> &str {
        &self.var
    }
}

impl fmt::Debug for SecretProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretProvider")
            .field("var", &self.var)
            .field("initialized", &self.cell.get().is_some())
            .finish()
    }
}
