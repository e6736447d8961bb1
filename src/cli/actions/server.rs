use crate::{
    api::{
        self,
        auth::{AuthConfig, AuthState, CredentialService, PgUserStore, SecretProvider},
    },
    cli::telemetry,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub db_max_connections: u32,
    pub cookie_secure: bool,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing secret is misconfigured, the database is
/// unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    // Refuse to start without a usable signing secret.
    let secrets = Arc::new(SecretProvider::from_env());
    secrets
        .get()
        .context("Invalid session token signing secret configuration")?;

    let pool = api::connect(&args.dsn, args.db_max_connections).await?;

    let store = Arc::new(PgUserStore::new(pool.clone()));
    let credentials = CredentialService::new(secrets, store)?;
    let config = AuthConfig::new().with_cookie_secure(args.cookie_secure);
    let auth_state = Arc::new(AuthState::new(config, credentials));

    let result = api::new(args.port, pool, auth_state).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("db_max_connections", args.db_max_connections.to_string()),
        ("cookie_secure", args.cookie_secure.to_string()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
