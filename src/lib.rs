//! # Storefront (backend security core)
//!
//! `storefront` is the backend of a small e-commerce storefront. This crate holds
//! the security-and-instrumentation core of that backend.
//!
//! ## Authentication
//!
//! Passwords are stored as Argon2id PHC strings. A successful login issues an
//! HS256 session token valid for 24 hours, delivered both in the response body
//! and as an `HttpOnly` `token` cookie. Requests authenticate with either the
//! cookie or an `Authorization: Bearer` header.
//!
//! The signing secret comes from `JWT_SECRET` and must be at least 32
//! characters. The server refuses to start otherwise; there is no fallback.
//!
//! ## Admin diagnostics
//!
//! `POST /api/admin/diagnostics` runs one command from a closed set of
//! read-only host/process introspection commands. Command names are matched
//! against an enum, never evaluated.
//!
//! ## Request-rate instrumentation
//!
//! Every inbound request is counted per elapsed second. On `SIGINT`/`SIGTERM`
//! the server drains, prints an RPS report to stdout and exits.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Log target for one-time startup confirmations; enabled at INFO regardless
/// of the verbosity flag.
pub const STARTUP_LOG_TARGET: &str = "storefront::startup";

/// Log target for the per-request access line; enabled at INFO regardless of
/// the verbosity flag.
pub const ACCESS_LOG_TARGET: &str = "storefront::access";

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
