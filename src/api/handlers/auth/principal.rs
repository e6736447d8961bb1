//! Authenticated identity extraction and authorization helpers.
//!
//! Flow Overview: read the bearer header or the `token` cookie, verify it with
//! the credential service, and return the identity. Admin-only routes layer a
//! role check on top. A missing or bad token is `Unauthorized` (401); a valid
//! identity without the admin role is `Forbidden` (403).

use axum::{
    http::{
        header::{AUTHORIZATION, COOKIE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use super::{credentials::CredentialService, types::Identity};

pub const TOKEN_COOKIE_NAME: &str = "token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Admin access required")]
    Forbidden,
}

impl AuthError {
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Resolve the request's session token into an identity.
///
/// # Errors
/// Returns `AuthError::Unauthorized` when no token is present or it fails
/// verification for any reason.
pub fn authenticate(
    headers: &HeaderMap,
    credentials: &CredentialService,
) -> Result<Identity, AuthError> {
    let token = extract_token(headers).ok_or(AuthError::Unauthorized)?;
    credentials
        .verify_token(&token)
        .ok_or(AuthError::Unauthorized)
}

/// Like [`authenticate`], and additionally require the admin role.
///
/// # Errors
/// Returns `AuthError::Unauthorized` for missing/invalid tokens and
/// `AuthError::Forbidden` for non-admin identities.
pub fn require_admin(
    headers: &HeaderMap,
    credentials: &CredentialService,
) -> Result<Identity, AuthError> {
    let identity = authenticate(headers, credentials)?;
    if identity.is_admin() {
        Ok(identity)
    } else {
        Err(AuthError::Forbidden)
    }
}

/// Bearer header first, then the `token` cookie.
pub(crate) fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    extract_cookie_token(headers)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn extract_cookie_token(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == TOKEN_COOKIE_NAME && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}
