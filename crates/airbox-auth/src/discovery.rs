//! OIDC discovery
//!
//! Fetches the subset of `/.well-known/openid-configuration` needed to run
//! the authorization-code flow. Metadata is fetched once per login and never
//! cached across runs.

use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::constants::DISCOVERY_PATH;
use crate::error::{Error, Result};

/// Endpoints advertised by an OIDC issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
}

/// Discovery document URL for an issuer. Tolerates a trailing slash.
pub fn discovery_url(issuer: &str) -> String {
    format!("{}{}", issuer.trim_end_matches('/'), DISCOVERY_PATH)
}

/// Fetch and validate the issuer's discovery document.
///
/// The document's `issuer` must match the requested issuer (ignoring a
/// trailing slash), otherwise the metadata is rejected.
pub async fn discover(
    client: &reqwest::Client,
    issuer: &str,
    cancel: &CancellationToken,
) -> Result<ProviderMetadata> {
    let url = discovery_url(issuer);
    debug!(url = %url, "fetching OIDC discovery document");

    let fetch = async {
        let response = client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Discovery(format!("{url} returned {status}")));
        }

        response
            .json::<ProviderMetadata>()
            .await
            .map_err(|e| Error::Discovery(format!("invalid discovery document: {e}")))
    };

    let metadata = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        result = fetch => result?,
    };

    if metadata.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
        return Err(Error::Discovery(format!(
            "issuer mismatch: expected {issuer}, document declares {}",
            metadata.issuer
        )));
    }

    Ok(metadata)
}
