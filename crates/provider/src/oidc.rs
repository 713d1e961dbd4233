//! OIDC authorization-code provider
//!
//! Holds the issuer's metadata and the user's credentials from the browser
//! login. Expired access tokens are renewed with the refresh grant; without
//! a refresh token the user has to log in again.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use airbox_auth::{AuthorizeEndpoint, CredentialStore, Credentials, ProviderMetadata};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::authenticated::AuthenticatedTransport;
use crate::source::RefreshTokenSource;
use crate::transport::HttpTransport;
use crate::{Provider, Result};

/// Provider backed by an OIDC issuer.
pub struct OidcProvider {
    metadata: ProviderMetadata,
    authorize: AuthorizeEndpoint,
    transport: AuthenticatedTransport,
}

impl OidcProvider {
    /// Build from already-known metadata, seeding credentials from `store`.
    pub async fn new(
        metadata: ProviderMetadata,
        client_id: String,
        http: reqwest::Client,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let inner: Arc<dyn HttpTransport> = Arc::new(http.clone());
        Self::new_with(metadata, client_id, http, inner, store, CancellationToken::new()).await
    }

    /// Like `new`, with an explicit API transport and cancellation token.
    pub async fn new_with(
        metadata: ProviderMetadata,
        client_id: String,
        http: reqwest::Client,
        inner: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let initial = store.load().await?;
        debug!(
            issuer = %metadata.issuer,
            stored = initial.is_some(),
            "initializing OIDC provider"
        );

        let authorize = AuthorizeEndpoint::new(&metadata.authorization_endpoint, &client_id);
        let source = RefreshTokenSource::new(http, metadata.token_endpoint.clone(), client_id);
        let transport = AuthenticatedTransport::new(inner, Box::new(source), store, initial)
            .with_cancellation(cancel);

        Ok(Self {
            metadata,
            authorize,
            transport,
        })
    }

    /// Discover the issuer's endpoints, then build the provider.
    pub async fn discover(
        issuer: &str,
        client_id: String,
        http: reqwest::Client,
        store: Arc<dyn CredentialStore>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let metadata = airbox_auth::discover(&http, issuer, &cancel).await?;
        let inner: Arc<dyn HttpTransport> = Arc::new(http.clone());
        Self::new_with(metadata, client_id, http, inner, store, cancel).await
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    pub fn client_id(&self) -> &str {
        self.authorize.client_id()
    }

    /// Current token, refreshed first if it has expired.
    pub async fn valid_credentials(&self) -> Result<Credentials> {
        self.transport.valid_credentials().await
    }
}

impl HttpTransport for OidcProvider {
    fn send(
        &self,
        request: reqwest::Request,
    ) -> Pin<Box<dyn Future<Output = Result<reqwest::Response>> + Send + '_>> {
        self.transport.send(request)
    }
}

impl Provider for OidcProvider {
    fn id(&self) -> &str {
        "oidc"
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
        &self.metadata.token_endpoint
    }

    fn authorization_url_builder(&self) -> Option<&AuthorizeEndpoint> {
        Some(&self.authorize)
    }
}
