//! HTTP surface: router assembly, middleware stack and server lifecycle.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware,
    routing::options,
    Extension, Router,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub(crate) mod handlers;
mod openapi;
pub mod request_rate;

pub use handlers::auth;
pub use handlers::diagnostics::Diagnostics;
pub use openapi::openapi;
pub use request_rate::RequestRateTracker;

use handlers::{auth::AuthState, health};

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Application router with the full middleware stack but no database pool.
///
/// The request counter is the outermost layer so every request is counted,
/// including unmatched routes.
pub fn app(
    auth_state: Arc<AuthState>,
    diagnostics: Arc<Diagnostics>,
    tracker: Arc<RequestRateTracker>,
) -> Router {
    let (router, _openapi) = router().split_for_parts();
    router
        .route("/health", options(health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(make_span)
                        .on_request(log_request),
                )
                .layer(Extension(auth_state))
                .layer(Extension(diagnostics)),
        )
        .layer(middleware::from_fn_with_state(
            tracker,
            request_rate::count_requests,
        ))
}

/// Open the `PostgreSQL` pool shared by the user store and `/health`.
///
/// # Errors
/// Returns an error if the database is unreachable
pub async fn connect(dsn: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(max_connections)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")
}

/// Serve until SIGINT/SIGTERM, then print the request-rate report to stdout.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails
pub async fn new(port: u16, pool: PgPool, auth_state: Arc<AuthState>) -> Result<()> {
    let diagnostics = Arc::new(Diagnostics::new());
    let tracker = Arc::new(RequestRateTracker::new());

    let app = app(auth_state, diagnostics, tracker.clone()).layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gracefully shutdown");
    print!("{}", tracker.report());

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for SIGINT: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

// span
fn make_span(request: &Request<Body>) -> Span {
    // Headers are left out: they carry bearer tokens and session cookies.
    let method = request.method().as_str();
    let path = request.uri().path();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", method, path, request_id)
}

/// One INFO line per request: client address, method and path. Headers are
/// never logged.
fn log_request(request: &Request<Body>, _span: &Span) {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    info!(
        target: crate::ACCESS_LOG_TARGET,
        ip = %client_ip(request.headers(), peer.as_deref()),
        method = %request.method(),
        path = request.uri().path(),
        "Incoming request"
    );
}

/// `X-Forwarded-For` (first hop), then `X-Real-IP`, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<&str>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.split(',').next())
        .map(str::trim)
        .filter(|val| !val.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|val| val.to_str().ok())
        .map(str::trim)
        .filter(|val| !val.is_empty());

    forwarded
        .or(real_ip)
        .or(peer)
        .unwrap_or("unknown")
        .to_string()
}
