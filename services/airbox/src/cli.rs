//! Command-line surface: `airbox [--config PATH] auth <action>`

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "airbox",
    version,
    about = "Authenticate against Airbyte Cloud or a self-managed deployment",
    after_help = "Environment:\n  \
        AIRBYTE_CLIENT_ID      application client ID\n  \
        AIRBYTE_CLIENT_SECRET  application client secret (oauth2 mode)\n  \
        LOG_LEVEL, RUST_LOG    log filter (default warn)\n  \
        LOG_FORMAT=json        JSON logs on stderr"
)]
pub struct Cli {
    /// Config file (default ~/.airbyte/airbox/config.toml)
    #[arg(long, global = true, env = "AIRBOX_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage stored credentials
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum AuthAction {
    /// Authenticate (client credentials or browser login)
    Login {
        /// Print the login URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Remove stored credentials
    Logout,
    /// Show stored credentials
    Status,
    /// Print a valid access token on stdout
    Token,
}
