//! Authorization endpoint URL construction

use reqwest::Url;

use crate::constants::DEFAULT_SCOPES;
use crate::error::{Error, Result};

/// Per-attempt values that go into the authorization URL.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationRequest<'a> {
    pub redirect_uri: &'a str,
    pub state: &'a str,
    pub code_challenge: &'a str,
}

/// Builds authorization-code + PKCE URLs for one client at one issuer.
///
/// Only interactive providers have one of these; client-credentials
/// providers never send the user to a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeEndpoint {
    url: String,
    client_id: String,
    scopes: String,
}

impl AuthorizeEndpoint {
    pub fn new(url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_id: client_id.into(),
            scopes: DEFAULT_SCOPES.to_string(),
        }
    }

    pub fn with_scopes(mut self, scopes: impl Into<String>) -> Self {
        self.scopes = scopes.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Full authorization URL with every parameter percent-encoded.
    pub fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> Result<String> {
        let url = Url::parse_with_params(
            &self.url,
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", request.redirect_uri),
                ("state", request.state),
                ("code_challenge", request.code_challenge),
                ("code_challenge_method", "S256"),
                ("scope", self.scopes.as_str()),
            ],
        )
        .map_err(|e| Error::Config(format!("invalid authorization endpoint {}: {e}", self.url)))?;
        Ok(url.into())
    }
}
