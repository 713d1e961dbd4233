//! Token endpoint client
//!
//! Every grant POSTs an `application/x-www-form-urlencoded` body to the
//! token endpoint and gets back either a token response or an error body.
//! Three grants are used:
//! 1. `client_credentials` for non-interactive application tokens
//! 2. `authorization_code` to finish the interactive PKCE login
//! 3. `refresh_token` to renew interactive tokens
//!
//! Error bodies come in two shapes: standard OAuth2
//! (`{"error", "error_description"}`) and Airbyte's `{"message"}`. Both are
//! tried in that order before falling back to the bare status code.

use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::credentials::default_token_type;
use crate::error::{Error, Result};

/// Token endpoint response, shared by all grants.
///
/// `expires_in` is a delta in seconds from the response time. Callers turn
/// it into an absolute timestamp via `Credentials::from_token_response`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Deserialize)]
struct MessageErrorBody {
    #[serde(default)]
    message: String,
}

/// POST `form` to `endpoint` and decode the token response.
///
/// Cancelling `cancel` aborts the in-flight request and returns
/// `Error::Cancelled` rather than a transport error.
pub async fn request_token(
    client: &reqwest::Client,
    endpoint: &str,
    form: &[(&str, &str)],
    cancel: &CancellationToken,
) -> Result<TokenResponse> {
    let grant_type = form
        .iter()
        .find(|(key, _)| *key == "grant_type")
        .map(|(_, value)| *value)
        .unwrap_or("unspecified");
    debug!(endpoint, grant_type, "requesting token");

    let exchange = async {
        let response = client
            .post(endpoint)
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading token response: {e}")))?;

        if status != StatusCode::OK {
            let err = error_from_body(status, &body);
            warn!(endpoint, grant_type, %status, error = %err, "token request rejected");
            return Err(err);
        }

        serde_json::from_str::<TokenResponse>(&body).map_err(|e| Error::Decode(e.to_string()))
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = exchange => result,
    }
}

/// Map a non-200 token endpoint response to a typed error.
fn error_from_body(status: StatusCode, body: &str) -> Error {
    if let Ok(oauth) = serde_json::from_str::<OAuthErrorBody>(body)
        && !oauth.error.is_empty()
    {
        return Error::OAuth {
            error: oauth.error,
            description: oauth.error_description.to_lowercase(),
        };
    }

    if let Ok(generic) = serde_json::from_str::<MessageErrorBody>(body)
        && !generic.message.is_empty()
    {
        return Error::Rejected(generic.message);
    }

    Error::Status(status.as_u16())
}

/// Mint an application token with `grant_type=client_credentials`.
pub async fn client_credentials_grant(
    client: &reqwest::Client,
    endpoint: &str,
    client_id: &str,
    client_secret: &str,
    cancel: &CancellationToken,
) -> Result<TokenResponse> {
    request_token(
        client,
        endpoint,
        &[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "client_credentials"),
        ],
        cancel,
    )
    .await
}

/// Renew an access token with `grant_type=refresh_token`.
pub async fn refresh_token_grant(
    client: &reqwest::Client,
    endpoint: &str,
    client_id: &str,
    refresh_token: &str,
    cancel: &CancellationToken,
) -> Result<TokenResponse> {
    request_token(
        client,
        endpoint,
        &[
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("refresh_token", refresh_token),
        ],
        cancel,
    )
    .await
}

/// Inputs for the authorization-code exchange.
///
/// `redirect_uri` must be byte-identical to the one in the authorization
/// URL, and `code_verifier` is the raw verifier, not the challenge.
#[derive(Debug, Clone, Copy)]
pub struct CodeExchange<'a> {
    pub client_id: &'a str,
    pub code: &'a str,
    pub redirect_uri: &'a str,
    pub code_verifier: &'a str,
}

/// Exchange an authorization code for tokens (last step of the PKCE flow).
pub async fn exchange_code(
    client: &reqwest::Client,
    endpoint: &str,
    exchange: &CodeExchange<'_>,
    cancel: &CancellationToken,
) -> Result<TokenResponse> {
    request_token(
        client,
        endpoint,
        &[
            ("grant_type", "authorization_code"),
            ("client_id", exchange.client_id),
            ("code", exchange.code),
            ("redirect_uri", exchange.redirect_uri),
            ("code_verifier", exchange.code_verifier),
        ],
        cancel,
    )
    .await
}
