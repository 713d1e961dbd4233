//! Per-attempt PKCE material

use std::fmt;

use airbox_auth::{compute_challenge, generate_state, generate_verifier};

/// Verifier, challenge and CSRF state for exactly one login attempt.
#[derive(Clone)]
pub struct PkceSession {
    verifier: String,
    challenge: String,
    state: String,
}

impl PkceSession {
    /// Fresh session with a random verifier and a random state token.
    pub fn generate() -> Self {
        Self::with_state_generator(generate_state)
    }

    /// Fresh random verifier, state token from `generator`.
    pub fn with_state_generator(generator: impl FnOnce() -> String) -> Self {
        let verifier = generate_verifier();
        let challenge = compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: generator(),
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn state(&self) -> &str {
        &self.state
    }
}

impl fmt::Debug for PkceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceSession")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .field("state", &self.state)
            .finish()
    }
}
