//! Admin diagnostics endpoint.
//!
//! Flow Overview:
//! 1) Require an admin session (401 without a valid token, 403 for non-admins).
//! 2) Read `{command}` from the body.
//! 3) Dispatch through the closed [`DiagnosticCommand`] allowlist.

mod commands;

pub use commands::{Diagnostics, DiagnosticsError};

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use super::{auth::require_admin, auth::AuthState, error_response};

#[derive(ToSchema, Deserialize, Debug)]
pub struct DiagnosticsRequest {
    pub command: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DiagnosticsResponse {
    pub command: String,
    #[schema(value_type = Object)]
    pub result: Value,
    pub timestamp: String,
}

#[utoipa::path(
    post,
    path = "/api/admin/diagnostics",
    request_body = DiagnosticsRequest,
    responses(
        (status = 200, description = "Command executed", body = DiagnosticsResponse),
        (status = 400, description = "Missing or unknown command"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin access required"),
    ),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn diagnostics(
    headers: HeaderMap,
    Extension(auth_state): Extension<Arc<AuthState>>,
    Extension(diagnostics): Extension<Arc<Diagnostics>>,
    payload: Result<Json<DiagnosticsRequest>, JsonRejection>,
) -> Response {
    let admin = match require_admin(&headers, auth_state.credentials()) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };

    let Ok(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
    };
    let Some(command) = request.command.filter(|command| !command.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Command parameter required");
    };

    match diagnostics.execute(&command) {
        Ok(output) => {
            info!(user_id = admin.id, command = %output.command, "Diagnostics command executed");
            (
                StatusCode::OK,
                Json(DiagnosticsResponse {
                    command: output.command.name().to_string(),
                    result: output.result,
                    timestamp: chrono::Utc::now()
                        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                }),
            )
                .into_response()
        }
        Err(err) => {
            warn!(user_id = admin.id, "Rejected diagnostics command");
            let DiagnosticsError::InvalidCommand { allowed } = &err;
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": err.to_string(),
                    "message": err.message(),
                    "allowed": allowed,
                })),
            )
                .into_response()
        }
    }
}
