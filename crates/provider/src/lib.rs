//! Credential providers for the Airbyte API
//!
//! Defines the `Provider` trait that decouples API callers from the
//! authentication strategy. Both strategies act as an `HttpTransport`
//! decorator: they inject a bearer token, renew it when it expires, and
//! retry once when the API answers 401.
//!
//! - `ClientCredentialsProvider`: non-interactive, mints application tokens
//!   with the client ID/secret and never uses the refresh grant
//! - `OidcProvider`: interactive, renews user tokens with the refresh grant
//!   and exposes the authorization URL builder for the browser login

pub mod authenticated;
pub mod oauth2;
pub mod oidc;
pub mod source;
pub mod transport;

#[cfg(test)]
mod testing;

pub use authenticated::AuthenticatedTransport;
pub use oauth2::{ClientCredentialsConfig, ClientCredentialsProvider};
pub use oidc::OidcProvider;
pub use source::{ClientCredentialsSource, RefreshTokenSource, TokenSource};
pub use transport::HttpTransport;

use airbox_auth::{AuthorizeEndpoint, Credentials};
use std::future::Future;
use std::pin::Pin;

/// Errors from provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Token lifecycle failure (token endpoint, store, cancellation).
    #[error(transparent)]
    Auth(#[from] airbox_auth::Error),

    /// The API request itself could not be sent.
    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid authorization header: {0}")]
    InvalidHeader(String),
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Abstraction over Airbyte authentication strategies.
///
/// Callers send API requests through the provider (`HttpTransport::send`)
/// and never handle tokens themselves. Capabilities that only interactive
/// providers have are exposed as `Option`s instead of requiring callers to
/// know the concrete type.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Provider>`).
pub trait Provider: HttpTransport {
    /// Identifier for logging and status output ("oauth2", "oidc")
    fn id(&self) -> &str;

    /// Credentials currently persisted in the provider's store.
    fn load_credentials(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Credentials>>> + Send + '_>>;

    /// Adopt and persist new credentials (e.g. after an interactive login).
    fn save_credentials(
        &self,
        credentials: Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Token endpoint used for every grant this provider performs.
    fn token_endpoint(&self) -> &str;

    /// Authorization URL builder, or `None` for non-interactive providers.
    fn authorization_url_builder(&self) -> Option<&AuthorizeEndpoint>;
}
