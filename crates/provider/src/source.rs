//! Token sources: how a provider obtains a replacement token
//!
//! The authenticated transport decides *when* a new token is needed; a
//! `TokenSource` decides *how* to get one.

use std::future::Future;
use std::pin::Pin;

use airbox_auth::{Credentials, Error, now_millis};
use common::Secret;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Strategy for obtaining fresh credentials.
pub trait TokenSource: Send + Sync {
    /// Label for logs and metrics ("client_credentials", "refresh_token")
    fn name(&self) -> &'static str;

    fn token_endpoint(&self) -> &str;

    /// Produce credentials to replace `current`, which is missing or expired.
    fn fetch<'a>(
        &'a self,
        current: Option<&'a Credentials>,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = airbox_auth::Result<Credentials>> + Send + 'a>>;
}

/// Mints a brand-new application token on every fetch.
///
/// Client-credentials tokens are re-minted, never refreshed: the client
/// secret is always available, so there is nothing a refresh token would add.
pub struct ClientCredentialsSource {
    http: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: Secret<String>,
}

impl ClientCredentialsSource {
    pub fn new(
        http: reqwest::Client,
        token_endpoint: String,
        client_id: String,
        client_secret: Secret<String>,
    ) -> Self {
        Self {
            http,
            token_endpoint,
            client_id,
            client_secret,
        }
    }
}

impl TokenSource for ClientCredentialsSource {
    fn name(&self) -> &'static str {
        "client_credentials"
    }

    fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    fn fetch<'a>(
        &'a self,
        _current: Option<&'a Credentials>,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = airbox_auth::Result<Credentials>> + Send + 'a>> {
        Box::pin(async move {
            let response = airbox_auth::client_credentials_grant(
                &self.http,
                &self.token_endpoint,
                &self.client_id,
                self.client_secret.expose(),
                cancel,
            )
            .await?;
            debug!(client_id = %self.client_id, "minted application token");
            Ok(Credentials::from_token_response(response, now_millis()))
        })
    }
}

/// Renews user tokens with the `refresh_token` grant.
pub struct RefreshTokenSource {
    http: reqwest::Client,
    token_endpoint: String,
    client_id: String,
}

impl RefreshTokenSource {
    pub fn new(http: reqwest::Client, token_endpoint: String, client_id: String) -> Self {
        Self {
            http,
            token_endpoint,
            client_id,
        }
    }
}

impl TokenSource for RefreshTokenSource {
    fn name(&self) -> &'static str {
        "refresh_token"
    }

    fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    fn fetch<'a>(
        &'a self,
        current: Option<&'a Credentials>,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = airbox_auth::Result<Credentials>> + Send + 'a>> {
        Box::pin(async move {
            let current = current.ok_or(Error::NoCredentials)?;
            let refresh_token = current
                .refresh_token
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or(Error::NoRefreshToken)?;

            let response = airbox_auth::refresh_token_grant(
                &self.http,
                &self.token_endpoint,
                &self.client_id,
                refresh_token,
                cancel,
            )
            .await?;

            let mut refreshed = current.clone();
            refreshed.apply_refresh(response, now_millis());
            Ok(refreshed)
        })
    }
}
