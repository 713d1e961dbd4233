//! airbox
//!
//! Command-line entry point for Airbyte authentication:
//! 1. Parses `airbox [--config PATH] auth <command>`
//! 2. Loads config (file, then AIRBYTE_* env overlay)
//! 3. Runs the command against the credential providers

mod cli;
mod commands;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let location = Config::resolve_path(cli.config.as_deref())?;
    debug!(path = %location.path.display(), explicit = location.explicit, "loading configuration");

    let config = Config::load(&location)
        .with_context(|| format!("failed to load config from {}", location.path.display()))?;
    debug!(
        mode = %config.auth.mode,
        api_url = %config.auth.api_url,
        credentials = %config.auth.credentials_path.display(),
        "configuration loaded"
    );

    match cli.command {
        Commands::Auth { action } => commands::run(action, &config).await,
    }
}

/// Logs go to stderr so stdout stays clean for `auth token`.
///
/// Filter from LOG_LEVEL or RUST_LOG (default `warn`); JSON output when
/// LOG_FORMAT=json.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
