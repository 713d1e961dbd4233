//! Configuration error types

use thiserror::Error;

/// Errors raised while resolving configuration.
///
/// These are never retried: the CLI reports them and asks the user to fix
/// their setup.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing {setting}: set {env_var} or add it to the config file, then re-run `airbox auth login`")]
    MissingSetting {
        setting: &'static str,
        env_var: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
