//! Session endpoints: register, login, logout and current user.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{
        header::{InvalidHeaderValue, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{
    principal::{authenticate, TOKEN_COOKIE_NAME},
    state::{AuthConfig, AuthState},
    types::{CredentialsRequest, LoginResponse, MessageResponse, UserResponse},
};
use crate::api::handlers::{error_response, normalize_email, valid_email};

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid email or password"),
        (status = 409, description = "Email already registered"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn register(
    Extension(auth_state): Extension<Arc<AuthState>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
    };
    let (Some(email), Some(password)) = (
        request.email.as_deref().map(normalize_email),
        request.password,
    ) else {
        return error_response(StatusCode::BAD_REQUEST, "Email and password are required");
    };

    if !valid_email(&email) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid email address");
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters long",
        );
    }

    match auth_state
        .credentials()
        .register_user(&email, &password)
        .await
    {
        Ok(Some(user)) => {
            info!(user_id = user.id, "User registered");
            (StatusCode::CREATED, Json(UserResponse { user })).into_response()
        }
        Ok(None) => error_response(StatusCode::CONFLICT, "Email already registered"),
        Err(err) => {
            error!("Failed to register user: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed")
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Login successful, token cookie set", body = LoginResponse),
        (status = 400, description = "Missing email or password"),
        (status = 401, description = "Invalid credentials"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(auth_state): Extension<Arc<AuthState>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
    };
    let (Some(email), Some(password)) = (
        request
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string),
        request.password.filter(|password| !password.is_empty()),
    ) else {
        return error_response(StatusCode::BAD_REQUEST, "Email and password are required");
    };

    let credentials = auth_state.credentials();
    let user = match credentials.authenticate_user(&email, &password).await {
        Ok(Some(user)) => user,
        Ok(None) => return error_response(StatusCode::UNAUTHORIZED, "Invalid credentials"),
        Err(err) => {
            error!("Failed to authenticate user: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
        }
    };

    let token = match credentials.generate_token(&user) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue session token: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
        }
    };

    let mut headers = HeaderMap::new();
    match token_cookie(auth_state.config(), &token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build token cookie: {err}"),
    }

    info!(user_id = user.id, "User logged in");
    (StatusCode::OK, headers, Json(LoginResponse { user, token })).into_response()
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Token cookie cleared", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(Extension(auth_state): Extension<Arc<AuthState>>) -> Response {
    // Tokens are stateless; logging out only clears the cookie.
    let mut headers = HeaderMap::new();
    if let Ok(cookie) = clear_token_cookie(auth_state.config()) {
        headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        headers,
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "auth"
)]
pub async fn me(headers: HeaderMap, Extension(auth_state): Extension<Arc<AuthState>>) -> Response {
    match authenticate(&headers, auth_state.credentials()) {
        Ok(user) => (StatusCode::OK, Json(UserResponse { user })).into_response(),
        Err(err) => err.into_response(),
    }
}

/// `HttpOnly` cookie carrying the session token.
fn token_cookie(config: &AuthConfig, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.cookie_max_age_seconds();
    let mut cookie =
        format!("{TOKEN_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_token_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{TOKEN_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn token_cookie_attributes() {
        let cookie = token_cookie(&AuthConfig::new(), "abc").unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("token=abc;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Max-Age=86400"));
        assert!(!value.contains("Secure"));

        let secure = token_cookie(&AuthConfig::new().with_cookie_secure(true), "abc").unwrap();
        assert!(secure.to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_token_cookie(&AuthConfig::new()).unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("token=;"));
        assert!(value.contains("Max-Age=0"));
    }
}
