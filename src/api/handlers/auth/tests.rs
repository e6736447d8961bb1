//! Router-level tests for the auth endpoints and the admin gate.

#![allow(clippy::unwrap_used)]

use super::{
    credentials::{hash_password, test_support::service_with, test_support::TEST_SECRET},
    AuthConfig, AuthState, Identity, MemoryUserStore, Role, UserStore,
};
use crate::api::{app, Diagnostics, RequestRateTracker};
use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE},
        Request, StatusCode,
    },
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const ADMIN_EMAIL: &str = "admin@example.com";
const USER_EMAIL: &str = "user@example.com";
const PASSWORD: &str = "correct horse battery";

struct TestApp {
    router: Router,
    tracker: Arc<RequestRateTracker>,
}

async fn test_app() -> TestApp {
    let store = Arc::new(MemoryUserStore::new());
    let hash = hash_password(PASSWORD).unwrap();
    store
        .create_user(ADMIN_EMAIL, &hash, Role::Admin)
        .await
        .unwrap();
    store
        .create_user(USER_EMAIL, &hash, Role::User)
        .await
        .unwrap();

    let credentials = service_with(TEST_SECRET, store);
    let auth_state = Arc::new(AuthState::new(AuthConfig::new(), credentials));
    let tracker = Arc::new(RequestRateTracker::new());
    let router = app(auth_state, Arc::new(Diagnostics::new()), tracker.clone());
    TestApp { router, tracker }
}

fn json_request(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn diagnostics_request(token: Option<&str>, body: &Value) -> Request<Body> {
    let mut request = json_request("/api/admin/diagnostics", body);
    if let Some(token) = token {
        request.headers_mut().insert(
            AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
    }
    request
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

async fn login_token(router: &Router, email: &str) -> String {
    let (status, body) = send(
        router,
        json_request(
            "/api/auth/login",
            &json!({ "email": email, "password": PASSWORD }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn login_sets_cookie_and_returns_token() {
    let app = test_app().await;
    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "/api/auth/login",
            &json!({ "email": "Admin@Example.com ", "password": PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["user"]["email"], ADMIN_EMAIL);
    assert_eq!(body["user"]["role"], "admin");
    assert!(body.get("password").is_none());
    assert!(cookie.contains(body["token"].as_str().unwrap()));
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let app = test_app().await;
    let (unknown_status, unknown_body) = send(
        &app.router,
        json_request(
            "/api/auth/login",
            &json!({ "email": "nobody@example.com", "password": PASSWORD }),
        ),
    )
    .await;
    let (wrong_status, wrong_body) = send(
        &app.router,
        json_request(
            "/api/auth/login",
            &json!({ "email": USER_EMAIL, "password": "wrong password" }),
        ),
    )
    .await;
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_body, wrong_body);
}

#[tokio::test]
async fn login_requires_email_and_password() {
    let app = test_app().await;
    let (status, _) = send(
        &app.router,
        json_request("/api/auth/login", &json!({ "email": USER_EMAIL })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_runs_system_info() {
    let app = test_app().await;
    let token = login_token(&app.router, ADMIN_EMAIL).await;

    let (status, body) = send(
        &app.router,
        diagnostics_request(Some(&token), &json!({ "command": "systemInfo" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["command"], "systemInfo");
    assert_eq!(body["result"]["platform"], std::env::consts::OS);
    assert!(chrono::DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn admin_token_in_cookie_is_accepted() {
    let app = test_app().await;
    let token = login_token(&app.router, ADMIN_EMAIL).await;

    let mut request = diagnostics_request(None, &json!({ "command": "uptime" }));
    request
        .headers_mut()
        .insert(COOKIE, format!("token={token}").parse().unwrap());
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["result"]["formatted"].is_string());
}

#[tokio::test]
async fn forged_token_is_unauthorized() {
    let app = test_app().await;
    let forger = service_with(
        "attacker-secret-0123456789-abcdefghijklm",
        Arc::new(MemoryUserStore::new()),
    );
    let forged = forger
        .generate_token(&Identity {
            id: 1,
            email: ADMIN_EMAIL.to_string(),
            role: Role::Admin,
        })
        .unwrap();

    let (status, body) = send(
        &app.router,
        diagnostics_request(Some(&forged), &json!({ "command": "systemInfo" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        diagnostics_request(None, &json!({ "command": "systemInfo" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn user_role_is_forbidden() {
    let app = test_app().await;
    let token = login_token(&app.router, USER_EMAIL).await;
    let (status, body) = send(
        &app.router,
        diagnostics_request(Some(&token), &json!({ "command": "systemInfo" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "error": "Admin access required" }));
}

#[tokio::test]
async fn unknown_and_code_like_commands_are_rejected() {
    let app = test_app().await;
    let token = login_token(&app.router, ADMIN_EMAIL).await;

    for command in ["rm -rf /", "require('child_process').execSync('id')"] {
        let (status, body) = send(
            &app.router,
            diagnostics_request(Some(&token), &json!({ "command": command })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid command");
        assert_eq!(body["allowed"].as_array().unwrap().len(), 6);
        assert!(!body.to_string().contains("child_process"));
    }
}

#[tokio::test]
async fn missing_command_is_bad_request() {
    let app = test_app().await;
    let token = login_token(&app.router, ADMIN_EMAIL).await;

    for payload in [json!({}), json!({ "command": "" })] {
        let (status, body) = send(&app.router, diagnostics_request(Some(&token), &payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Command parameter required" }));
    }
}

#[tokio::test]
async fn register_then_login() {
    let app = test_app().await;
    let credentials = json!({ "email": "new@example.com", "password": "long enough" });

    let (status, body) = send(
        &app.router,
        json_request("/api/auth/register", &credentials),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["role"], "user");

    let (status, _) = send(
        &app.router,
        json_request("/api/auth/register", &credentials),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app.router, json_request("/api/auth/login", &credentials)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "new@example.com");
}

#[tokio::test]
async fn register_validates_input() {
    let app = test_app().await;
    for payload in [
        json!({ "email": "not-an-email", "password": "long enough" }),
        json!({ "email": "short@example.com", "password": "short" }),
        json!({ "email": "missing@example.com" }),
    ] {
        let (status, _) = send(&app.router, json_request("/api/auth/register", &payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn me_returns_current_user() {
    let app = test_app().await;
    let token = login_token(&app.router, USER_EMAIL).await;

    let request = Request::builder()
        .uri("/api/auth/me")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], USER_EMAIL);

    let request = Request::builder()
        .uri("/api/auth/me")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_clears_cookie() {
    let app = test_app().await;
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn every_request_is_counted() {
    let app = test_app().await;
    send(
        &app.router,
        diagnostics_request(None, &json!({ "command": "systemInfo" })),
    )
    .await;
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.tracker.total(), 2);
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = test_app().await;
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header("x-request-id", "test-request")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "test-request"
    );
}

#[tokio::test]
async fn mixed_case_stored_email_can_log_in() {
    let store = Arc::new(MemoryUserStore::new());
    let hash = hash_password(PASSWORD).unwrap();
    store
        .create_user("Legacy@Example.com", &hash, Role::User)
        .await
        .unwrap();
    let auth_state = Arc::new(AuthState::new(
        AuthConfig::new(),
        service_with(TEST_SECRET, store),
    ));
    let router = app(
        auth_state,
        Arc::new(Diagnostics::new()),
        Arc::new(RequestRateTracker::new()),
    );

    for email in ["Legacy@Example.com", "legacy@example.com"] {
        let (status, body) = send(
            &router,
            json_request(
                "/api/auth/login",
                &json!({ "email": email, "password": PASSWORD }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "login as {email}");
        assert_eq!(body["user"]["email"], "Legacy@Example.com");
    }
}

#[tokio::test]
async fn register_rejects_case_variant_of_existing_email() {
    let app = test_app().await;
    let (status, _) = send(
        &app.router,
        json_request(
            "/api/auth/register",
            &json!({ "email": "USER@example.com", "password": "long enough" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
