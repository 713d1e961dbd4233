//! Error types for authentication operations

use std::time::Duration;

/// Errors from token requests, credential storage and the login flow.
///
/// Messages are shown to the user by the CLI as-is, so each variant reads
/// as a complete sentence fragment.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure talking to the token endpoint (DNS, refused, reset).
    #[error("failed to execute token request: {0}")]
    Http(String),

    /// Standard OAuth2 error body (`error` + `error_description`).
    #[error("failed to authenticate: {error} - {description}")]
    OAuth { error: String, description: String },

    /// Airbyte-style `{"message": ...}` error body.
    #[error("authentication failed: {0}")]
    Rejected(String),

    /// Non-200 response with no recognizable error body.
    #[error("authentication failed with status {0}")]
    Status(u16),

    #[error("failed to decode token response: {0}")]
    Decode(String),

    #[error("authentication cancelled: context ended before completion")]
    Cancelled,

    #[error("authentication timeout after {0:?}")]
    Timeout(Duration),

    #[error("invalid state parameter")]
    InvalidState,

    #[error("authorization failed: {error} - {description}")]
    AuthorizationDenied { error: String, description: String },

    #[error("no authorization code received")]
    MissingCode,

    #[error("token without expiration is not allowed")]
    MissingExpiry,

    #[error("no valid credentials available")]
    NoCredentials,

    #[error("access token expired and no refresh token available")]
    NoRefreshToken,

    #[error("failed to start callback server: {0}")]
    CallbackServer(String),

    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    #[error("invalid auth configuration: {0}")]
    Config(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_reports_configured_duration() {
        let err = Error::Timeout(Duration::from_millis(100));
        assert_eq!(err.to_string(), "authentication timeout after 100ms");

        let err = Error::Timeout(Duration::from_secs(300));
        assert_eq!(err.to_string(), "authentication timeout after 300s");
    }

    #[test]
    fn cancellation_and_timeout_are_distinguishable() {
        let cancelled = Error::Cancelled.to_string();
        let timeout = Error::Timeout(Duration::from_secs(1)).to_string();
        assert!(cancelled.contains("cancelled"));
        assert!(!timeout.contains("cancelled"));
    }

    #[test]
    fn oauth_error_combines_code_and_description() {
        let err = Error::OAuth {
            error: "invalid_client".into(),
            description: "client authentication failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to authenticate: invalid_client - client authentication failed"
        );
    }
}
