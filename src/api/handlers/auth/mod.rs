//! Auth handlers and supporting modules.
//!
//! This module owns the signing secret, password hashing, session tokens and the
//! request-level authentication helpers used by every protected route.
//!
//! ## Signing secret
//!
//! `JWT_SECRET` is validated once at startup (at least 32 characters) and cached
//! for the life of the process. Rotating it requires a restart and invalidates
//! every outstanding session token.
//!
//! ## Session tokens
//!
//! Tokens are HS256 JWTs carrying `{id, email, role, iat, exp}` with a 24 hour
//! lifetime. Verification failures are reported internally as `TokenError` but
//! always surface to clients as a plain `401 Unauthorized`.

pub(crate) mod credentials;
pub(crate) mod principal;
pub(crate) mod secret;
pub(crate) mod session;
mod state;
pub(crate) mod storage;
pub(crate) mod types;

pub use credentials::{CredentialError, CredentialService, TokenError};
pub use principal::{authenticate, require_admin, AuthError};
pub use secret::{JwtSecret, SecretError, SecretProvider};
pub use state::{AuthConfig, AuthState};
pub use storage::{MemoryUserStore, PgUserStore, UserStore};
pub use types::{Identity, Role};

#[cfg(test)]
mod tests;
