//! OAuth2 client-credentials provider
//!
//! Non-interactive: the client ID and secret come from the environment and
//! every token is minted fresh with `grant_type=client_credentials`.
//! Construction fetches the first token immediately so bad credentials are
//! reported at startup rather than on the first API call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use airbox_auth::{AuthorizeEndpoint, CredentialStore, Credentials, OAUTH2_TOKEN_PATH};
use common::Secret;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::authenticated::AuthenticatedTransport;
use crate::source::ClientCredentialsSource;
use crate::transport::HttpTransport;
use crate::{Provider, Result};

/// Client credentials for an Airbyte application.
#[derive(Debug, Clone)]
pub struct ClientCredentialsConfig {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
}

impl ClientCredentialsConfig {
    /// Config for the standard application token endpoint under `api_url`.
    pub fn for_api(api_url: &str, client_id: String, client_secret: Secret<String>) -> Self {
        Self {
            token_endpoint: format!("{}{}", api_url.trim_end_matches('/'), OAUTH2_TOKEN_PATH),
            client_id,
            client_secret,
        }
    }
}

/// Provider backed by the OAuth2 client-credentials grant.
pub struct ClientCredentialsProvider {
    transport: AuthenticatedTransport,
}

impl ClientCredentialsProvider {
    /// Build the provider and fetch its first token.
    ///
    /// Fails if the token endpoint rejects the credentials.
    pub async fn connect(
        config: ClientCredentialsConfig,
        http: reqwest::Client,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let inner: Arc<dyn HttpTransport> = Arc::new(http.clone());
        Self::connect_with(config, http, inner, store, CancellationToken::new()).await
    }

    /// Like `connect`, with an explicit API transport and cancellation token.
    pub async fn connect_with(
        config: ClientCredentialsConfig,
        http: reqwest::Client,
        inner: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let client_id = config.client_id.clone();
        let source = ClientCredentialsSource::new(
            http,
            config.token_endpoint,
            config.client_id,
            config.client_secret,
        );
        let transport = AuthenticatedTransport::new(inner, Box::new(source), store, None)
            .with_cancellation(cancel);

        transport.valid_credentials().await?;
        info!(client_id = %client_id, "authenticated with client credentials");

        Ok(Self { transport })
    }

    /// Current token, re-minted first if it has expired.
    pub async fn valid_credentials(&self) -> Result<Credentials> {
        self.transport.valid_credentials().await
    }
}

impl HttpTransport for ClientCredentialsProvider {
    fn send(
        &self,
        request: reqwest::Request,
    ) -> Pin<Box<dyn Future<Output = Result<reqwest::Response>> + Send + '_>> {
        self.transport.send(request)
    }
}

impl Provider for ClientCredentialsProvider {
    fn id(&self) -> &str {
        "oauth2"
    }

    fn load_credentials(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Credentials>>> + Send + '_>> {
        Box::pin(async move { Ok(self.transport.store().load().await?) })
    }

    fn save_credentials(
        &self,
        credentials: Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.transport.replace(credentials).await })
    }

    fn token_endpoint(&self) -> &str {
        self.transport.token_endpoint()
    }

    fn authorization_url_builder(&self) -> Option<&AuthorizeEndpoint> {
        None
    }
}
