//! `airbox auth` subcommands
//!
//! All user-facing output lives here. Human-readable messages go to
//! stderr; `auth token` prints only the token on stdout so it can be
//! captured by scripts.

use std::sync::Arc;
use std::time::Duration;

use airbox_auth::{CredentialStore, Credentials, FileCredentialStore, now_millis};
use airbox_login::{BrowserLauncher, FlowConfig, SystemBrowser};
use anyhow::{Context, Result};
use provider::{
    ClientCredentialsConfig, ClientCredentialsProvider, HttpTransport, OidcProvider, Provider,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::AuthAction;
use crate::config::{AuthMode, Config};

/// Timeout for individual token and discovery requests.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run(action: AuthAction, config: &Config) -> Result<()> {
    match action {
        AuthAction::Login { no_browser } => login(config, !no_browser).await,
        AuthAction::Logout => logout(config).await,
        AuthAction::Status => status(config).await,
        AuthAction::Token => token(config).await,
    }
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

fn credential_store(config: &Config) -> Arc<dyn CredentialStore> {
    Arc::new(FileCredentialStore::new(config.auth.credentials_path.clone()))
}

/// Cancellation token tripped by Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received SIGINT, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

async fn client_credentials_provider(
    config: &Config,
    http: reqwest::Client,
    cancel: CancellationToken,
) -> Result<ClientCredentialsProvider> {
    let client_id = config.auth.require_client_id()?;
    let secret = config.auth.require_client_secret()?;
    let inner: Arc<dyn HttpTransport> = Arc::new(http.clone());

    ClientCredentialsProvider::connect_with(
        ClientCredentialsConfig::for_api(&config.auth.api_url, client_id.to_string(), secret.clone()),
        http,
        inner,
        credential_store(config),
        cancel,
    )
    .await
    .with_context(|| format!("client credentials login to {} failed", config.auth.api_url))
}

async fn oidc_provider(
    config: &Config,
    http: reqwest::Client,
    cancel: CancellationToken,
) -> Result<OidcProvider> {
    let issuer = config.auth.require_issuer()?;
    let client_id = config.auth.require_client_id()?;

    OidcProvider::discover(
        issuer,
        client_id.to_string(),
        http,
        credential_store(config),
        cancel,
    )
    .await
    .with_context(|| format!("failed to discover OIDC issuer {issuer}"))
}

/// Prints the URL so it can be opened by hand, then optionally opens it.
struct TerminalBrowser {
    open: bool,
}

impl BrowserLauncher for TerminalBrowser {
    fn launch(&self, url: &str) -> std::io::Result<()> {
        eprintln!("Open the following URL to log in:\n\n  {url}\n");
        if self.open {
            SystemBrowser.launch(url)?;
        }
        eprintln!("Waiting for the browser to complete login...");
        Ok(())
    }
}

async fn login(config: &Config, open_browser: bool) -> Result<()> {
    let http = http_client()?;
    let cancel = cancel_on_ctrl_c();

    let credentials = match config.auth.mode {
        AuthMode::Oauth2 => client_credentials_provider(config, http, cancel)
            .await?
            .valid_credentials()
            .await
            .context("failed to read application token")?,
        AuthMode::Oidc => {
            let provider = oidc_provider(config, http.clone(), cancel.clone()).await?;
            let flow = FlowConfig::default()
                .with_port(config.auth.callback_port)
                .with_timeout(Duration::from_secs(config.auth.timeout_secs));
            let launcher = TerminalBrowser { open: open_browser };
            airbox_login::login(&provider, http, flow, &launcher, &cancel)
                .await
                .context("browser login failed")?
        }
    };

    eprintln!(
        "Logged in ({}). Token {}.",
        config.auth.mode,
        describe_expiry(&credentials, now_millis())
    );
    eprintln!(
        "Credentials saved to {}",
        config.auth.credentials_path.display()
    );
    Ok(())
}

async fn logout(config: &Config) -> Result<()> {
    credential_store(config)
        .clear()
        .await
        .context("failed to remove stored credentials")?;
    eprintln!("Logged out.");
    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    let stored = credential_store(config)
        .load()
        .await
        .context("failed to read stored credentials")?;

    match stored {
        None => println!("Not logged in. Run `airbox auth login`."),
        Some(credentials) => {
            println!("mode:          {}", config.auth.mode);
            println!("token type:    {}", credentials.token_type);
            println!("access token:  {}", describe_expiry(&credentials, now_millis()));
            println!(
                "refresh token: {}",
                if credentials.has_refresh_token() {
                    "present"
                } else {
                    "none"
                }
            );
            println!("stored at:     {}", config.auth.credentials_path.display());
        }
    }
    Ok(())
}

async fn token(config: &Config) -> Result<()> {
    let credentials = access_token(config, cancel_on_ctrl_c()).await?;
    println!("{}", credentials.access_token);
    Ok(())
}

/// Valid credentials for the configured mode, renewed if needed.
async fn access_token(config: &Config, cancel: CancellationToken) -> Result<Credentials> {
    let http = http_client()?;
    match config.auth.mode {
        AuthMode::Oauth2 => {
            let provider = client_credentials_provider(config, http, cancel).await?;
            Ok(provider.valid_credentials().await?)
        }
        AuthMode::Oidc => {
            let provider = oidc_provider(config, http, cancel).await?;
            if provider.load_credentials().await?.is_none() {
                anyhow::bail!("not logged in; run `airbox auth login`");
            }
            Ok(provider
                .valid_credentials()
                .await
                .context("stored session can no longer be renewed; run `airbox auth login`")?)
        }
    }
}

/// Human description of how long a token stays usable.
fn describe_expiry(credentials: &Credentials, now: u64) -> String {
    let Some(expires_at) = credentials.expires_at else {
        return "has no recorded expiry (treated as expired)".into();
    };
    if credentials.is_expired_at(now) {
        return "expired".into();
    }
    let remaining = Duration::from_millis(expires_at.saturating_sub(now));
    let minutes = remaining.as_secs() / 60;
    if minutes >= 60 {
        format!("valid for {}h{:02}m", minutes / 60, minutes % 60)
    } else {
        format!("valid for {minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    fn credentials(expires_at: Option<u64>) -> Credentials {
        Credentials {
            access_token: "at".into(),
            refresh_token: None,
            token_type: "Bearer".into(),
            expires_at,
        }
    }

    #[test]
    fn expiry_descriptions() {
        let now = 1_700_000_000_000;
        assert_eq!(
            describe_expiry(&credentials(Some(now + 2 * 3_600_000 + 5 * 60_000)), now),
            "valid for 2h05m"
        );
        assert_eq!(
            describe_expiry(&credentials(Some(now + 10 * 60_000)), now),
            "valid for 10m"
        );
        assert_eq!(describe_expiry(&credentials(Some(now + 30_000)), now), "expired");
        assert_eq!(
            describe_expiry(&credentials(None), now),
            "has no recorded expiry (treated as expired)"
        );
    }

    async fn spawn_token_endpoint(calls: Arc<AtomicUsize>) -> String {
        let router = Router::new().route(
            "/v1/applications/token",
            post(move || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Json::<Value>(json!({
                        "access_token": format!("app-{n}"),
                        "token_type": "Bearer",
                        "expires_in": 900
                    }))
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn oauth2_config(api_url: String, dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.auth.api_url = api_url;
        config.auth.client_id = Some("app-id".into());
        config.auth.client_secret = Some(common::Secret::new("app-secret".to_string()));
        config.auth.credentials_path = dir.path().join("credentials.json");
        config
    }

    #[tokio::test]
    async fn oauth2_token_is_minted_and_persisted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let api_url = spawn_token_endpoint(calls.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let config = oauth2_config(api_url, &dir);

        let credentials = access_token(&config, CancellationToken::new()).await.unwrap();
        assert_eq!(credentials.access_token, "app-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stored = credential_store(&config).load().await.unwrap();
        assert_eq!(stored, Some(credentials));
    }

    #[tokio::test]
    async fn oauth2_without_secret_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = oauth2_config("http://127.0.0.1:9".into(), &dir);
        config.auth.client_secret = None;

        let err = access_token(&config, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("AIRBYTE_CLIENT_SECRET"), "{err}");
    }

    #[tokio::test]
    async fn oidc_without_issuer_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = oauth2_config("http://127.0.0.1:9".into(), &dir);
        config.auth.mode = AuthMode::Oidc;

        let err = access_token(&config, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("auth.issuer"), "{err}");
    }

    #[tokio::test]
    async fn logout_removes_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.auth.credentials_path = dir.path().join("credentials.json");
        let store = credential_store(&config);
        store.save(&credentials(Some(now_millis() + 600_000))).await.unwrap();

        logout(&config).await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        assert!(!config.auth.credentials_path.exists());
    }
}
