use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(3000);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let db_max_connections = matches
        .get_one::<u32>("db-max-connections")
        .copied()
        .unwrap_or(5);
    let cookie_secure = matches.get_flag("cookie-secure");

    Ok(Action::Server(Args {
        port,
        dsn,
        db_max_connections,
        cookie_secure,
    }))
}
