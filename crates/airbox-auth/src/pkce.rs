//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier, its S256 challenge, and the CSRF `state`
//! token for one login attempt. The verifier never leaves this process
//! until the token exchange; the authorization server only sees the
//! challenge, so an intercepted authorization code is useless without it.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Generate a cryptographically random PKCE code verifier.
///
/// 32 random bytes encoded as URL-safe base64 without padding, giving a
/// 43-character verifier (the RFC 7636 minimum length).
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate an unguessable CSRF state token (UUID v4, simple form).
pub fn generate_state() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
