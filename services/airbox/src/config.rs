//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is only ever read from AIRBYTE_CLIENT_SECRET, never
//! from the TOML file.

use std::fmt;
use std::path::{Path, PathBuf};

use common::Secret;
use serde::Deserialize;

const CLIENT_ID_ENV: &str = "AIRBYTE_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "AIRBYTE_CLIENT_SECRET";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Application client ID/secret (Airbyte Cloud)
    #[default]
    Oauth2,
    /// Browser login against an OIDC issuer (self-managed deployments)
    Oidc,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Oauth2 => f.write_str("oauth2"),
            AuthMode::Oidc => f.write_str("oidc"),
        }
    }
}

/// `[auth]` table
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub api_url: String,
    pub issuer: Option<String>,
    pub client_id: Option<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// 0 lets the OS pick a free port.
    pub callback_port: u16,
    /// Browser login deadline.
    pub timeout_secs: u64,
    /// Empty until resolved at load; defaults to `credentials.json` beside
    /// the config file.
    pub credentials_path: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            api_url: "https://api.airbyte.com".into(),
            issuer: None,
            client_id: None,
            client_secret: None,
            callback_port: 0,
            timeout_secs: 300,
            credentials_path: PathBuf::new(),
        }
    }
}

impl AuthConfig {
    pub fn require_client_id(&self) -> common::Result<&str> {
        self.client_id
            .as_deref()
            .ok_or(common::Error::MissingSetting {
                setting: "client ID",
                env_var: CLIENT_ID_ENV,
            })
    }

    pub fn require_client_secret(&self) -> common::Result<&Secret<String>> {
        self.client_secret
            .as_ref()
            .ok_or(common::Error::MissingSetting {
                setting: "client secret",
                env_var: CLIENT_SECRET_ENV,
            })
    }

    pub fn require_issuer(&self) -> common::Result<&str> {
        self.issuer.as_deref().ok_or_else(|| {
            common::Error::Config("auth.issuer is required when auth.mode = \"oidc\"".into())
        })
    }
}

/// Where the config file lives and whether the user asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    /// Named via `--config` or AIRBOX_CONFIG; a missing file is then an error.
    pub explicit: bool,
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// A missing file at the default location yields the defaults, so a
    /// first run with only env vars set works.
    pub fn load(location: &ConfigLocation) -> common::Result<Self> {
        let mut config = match std::fs::read_to_string(&location.path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !location.explicit => {
                Config::default()
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(id) = std::env::var(CLIENT_ID_ENV).ok().and_then(non_blank) {
            config.auth.client_id = Some(id);
        }
        if let Some(secret) = std::env::var(CLIENT_SECRET_ENV).ok().and_then(non_blank) {
            config.auth.client_secret = Some(Secret::new(secret));
        }

        if config.auth.credentials_path.as_os_str().is_empty() {
            let dir = location.path.parent().unwrap_or_else(|| Path::new("."));
            config.auth.credentials_path = dir.join("credentials.json");
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !is_http_url(&self.auth.api_url) {
            return Err(common::Error::Config(format!(
                "auth.api_url must start with http:// or https://, got: {}",
                self.auth.api_url
            )));
        }

        if let Some(issuer) = &self.auth.issuer
            && !is_http_url(issuer)
        {
            return Err(common::Error::Config(format!(
                "auth.issuer must start with http:// or https://, got: {issuer}"
            )));
        }

        if self.auth.timeout_secs == 0 {
            return Err(common::Error::Config(
                "auth.timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Use the path from `--config`/AIRBOX_CONFIG when given, otherwise
    /// `$HOME/.airbyte/airbox/config.toml`.
    pub fn resolve_path(explicit_path: Option<&Path>) -> common::Result<ConfigLocation> {
        if let Some(path) = explicit_path {
            return Ok(ConfigLocation {
                path: path.to_path_buf(),
                explicit: true,
            });
        }
        let home = std::env::var_os("HOME").ok_or_else(|| {
            common::Error::Config("HOME is not set; pass --config or set AIRBOX_CONFIG".into())
        })?;
        Ok(ConfigLocation {
            path: PathBuf::from(home).join(".airbyte/airbox/config.toml"),
            explicit: false,
        })
    }
}
