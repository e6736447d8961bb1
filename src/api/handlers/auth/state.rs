//! Auth state and configuration shared with handlers.

use super::credentials::{CredentialService, TOKEN_TTL_SECONDS};

#[derive(Clone, Debug)]
pub struct AuthConfig {
    cookie_secure: bool,
    cookie_max_age_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cookie_secure: false,
            cookie_max_age_seconds: TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub fn cookie_max_age_seconds(&self) -> i64 {
        self.cookie_max_age_seconds
    }
}

#[derive(Debug)]
pub struct AuthState {
    config: AuthConfig,
    credentials: CredentialService,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, credentials: CredentialService) -> Self {
        Self {
            config,
            credentials,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialService {
        &self.credentials
    }
}
