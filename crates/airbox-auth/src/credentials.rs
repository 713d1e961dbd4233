//! Credential model and expiry policy
//!
//! `expires_at` is an absolute unix timestamp in milliseconds, computed from
//! the token endpoint's `expires_in` delta at the moment the response was
//! received. Persisting the absolute value means a reload after a restart
//! still knows when the token dies.
//!
//! A credential without an expiry is treated as expired everywhere. Tokens
//! that never expire are not something this client is willing to trust, so
//! the providers will always try to replace one, and the interactive login
//! refuses to store one at all.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_TOKEN_TYPE, EXPIRY_SKEW_MILLIS};
use crate::token::TokenResponse;

/// Current time as unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub(crate) fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

/// An access token plus what is needed to renew it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expiration as unix timestamp in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Credentials {
    /// Build credentials from a token endpoint response received at `now`.
    ///
    /// A zero or missing `expires_in` leaves `expires_at` unset, which the
    /// expiry check treats as already expired.
    pub fn from_token_response(response: TokenResponse, now: u64) -> Self {
        let token_type = non_empty_token_type(response.token_type);
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            token_type,
            expires_at: expiry_from(response.expires_in, now),
        }
    }

    /// Fold a refresh response into these credentials.
    ///
    /// The refresh token is only replaced when the server rotated it; many
    /// issuers omit it from refresh responses and the old one stays valid.
    pub fn apply_refresh(&mut self, response: TokenResponse, now: u64) {
        self.access_token = response.access_token;
        self.token_type = non_empty_token_type(response.token_type);
        self.expires_at = expiry_from(response.expires_in, now);
        if let Some(rotated) = response.refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token = Some(rotated);
        }
    }

    /// Whether the token should be considered dead at `now` (unix ms),
    /// including the skew buffer.
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at.saturating_sub(EXPIRY_SKEW_MILLIS),
            None => true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Copy of these credentials that every expiry check will reject.
    /// Written to the store when the server rejects the token with a 401.
    pub fn expired(&self) -> Self {
        Self {
            expires_at: Some(0),
            ..self.clone()
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn non_empty_token_type(token_type: String) -> String {
    if token_type.trim().is_empty() {
        default_token_type()
    } else {
        token_type
    }
}

fn expiry_from(expires_in: Option<u64>, now: u64) -> Option<u64> {
    expires_in
        .filter(|secs| *secs > 0)
        .map(|secs| now.saturating_add(secs.saturating_mul(1000)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_760_000_000_000;

    fn expiring_in(offset_millis: i64) -> Credentials {
        Credentials {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            token_type: "Bearer".into(),
            expires_at: Some((NOW as i64 + offset_millis) as u64),
        }
    }

    fn response(access: &str, refresh: Option<&str>, expires_in: Option<u64>) -> TokenResponse {
        TokenResponse {
            access_token: access.into(),
            token_type: "Bearer".into(),
            expires_in,
            refresh_token: refresh.map(Into::into),
            id_token: None,
        }
    }

    #[test]
    fn not_expired_outside_skew_buffer() {
        assert!(!expiring_in(90_000).is_expired_at(NOW));
    }

    #[test]
    fn expired_inside_skew_buffer() {
        assert!(expiring_in(30_000).is_expired_at(NOW));
    }

    #[test]
    fn expired_in_the_past() {
        assert!(expiring_in(-60_000).is_expired_at(NOW));
    }

    #[test]
    fn missing_expiry_counts_as_expired() {
        let creds = Credentials {
            expires_at: None,
            ..expiring_in(0)
        };
        assert!(creds.is_expired_at(NOW));
        assert!(creds.is_expired());
    }

    #[test]
    fn expired_placeholder_is_always_expired() {
        let creds = expiring_in(3_600_000).expired();
        assert!(creds.is_expired_at(NOW));
        assert_eq!(creds.access_token, "at");
        assert_eq!(creds.refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    fn json_roundtrip_preserves_every_field() {
        let creds = expiring_in(3_600_000);
        let json = serde_json::to_string(&creds).unwrap();
        let back: Credentials = serde_json::from_str(&json).unwrap();
        assert_eq!(back, creds);
        assert_eq!(back.expires_at, Some(NOW + 3_600_000));
    }

    #[test]
    fn token_type_defaults_to_bearer_when_absent_from_file() {
        let creds: Credentials =
            serde_json::from_str(r#"{"access_token":"at","expires_at":1}"#).unwrap();
        assert_eq!(creds.token_type, "Bearer");
        assert!(creds.refresh_token.is_none());
    }

    #[test]
    fn from_response_computes_absolute_expiry() {
        let creds = Credentials::from_token_response(response("at", Some("rt"), Some(3600)), NOW);
        assert_eq!(creds.expires_at, Some(NOW + 3_600_000));
        assert_eq!(creds.refresh_token.as_deref(), Some("rt"));
        assert_eq!(creds.authorization_header(), "Bearer at");
    }

    #[test]
    fn from_response_without_expiry_leaves_it_unset() {
        let creds = Credentials::from_token_response(response("at", None, Some(0)), NOW);
        assert_eq!(creds.expires_at, None);
    }

    #[test]
    fn empty_token_type_falls_back_to_bearer() {
        let mut resp = response("at", None, Some(60));
        resp.token_type = String::new();
        let creds = Credentials::from_token_response(resp, NOW);
        assert_eq!(creds.token_type, "Bearer");
    }

    #[test]
    fn refresh_keeps_refresh_token_when_not_rotated() {
        let mut creds = expiring_in(-1);
        creds.apply_refresh(response("at2", None, Some(600)), NOW);
        assert_eq!(creds.access_token, "at2");
        assert_eq!(creds.refresh_token.as_deref(), Some("rt"));
        assert_eq!(creds.expires_at, Some(NOW + 600_000));
    }

    #[test]
    fn refresh_replaces_rotated_refresh_token() {
        let mut creds = expiring_in(-1);
        creds.apply_refresh(response("at2", Some("rt2"), Some(600)), NOW);
        assert_eq!(creds.refresh_token.as_deref(), Some("rt2"));
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let debug = format!("{:?}", expiring_in(0));
        assert!(!debug.contains("\"at\""), "got: {debug}");
        assert!(debug.contains("REDACTED"));
    }
}
