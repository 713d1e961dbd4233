//! Airbox authentication primitives
//!
//! Credential model and storage, PKCE generation, the token endpoint
//! client, OIDC discovery and authorization URL construction. The
//! transport-level token lifecycle lives in the `provider` crate and the
//! interactive browser login in `airbox-login`; both build on this crate.
//!
//! Credential flow:
//! 1. `discovery::discover()` resolves the issuer's endpoints (OIDC only)
//! 2. `pkce::generate_verifier()` + `pkce::compute_challenge()` per login
//! 3. `AuthorizeEndpoint::authorization_url()` sends the user to the browser
//! 4. `token::exchange_code()` trades the callback code for tokens
//! 5. `Credentials` persisted via a `CredentialStore`
//! 6. `token::refresh_token_grant()` or `token::client_credentials_grant()`
//!    mints replacements once `Credentials::is_expired()` reports true

pub mod authorize;
pub mod constants;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod pkce;
pub mod store;
pub mod token;

pub use authorize::{AuthorizationRequest, AuthorizeEndpoint};
pub use constants::*;
pub use credentials::{Credentials, now_millis};
pub use discovery::{ProviderMetadata, discover};
pub use error::{Error, Result};
pub use pkce::{compute_challenge, generate_state, generate_verifier};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use token::{
    CodeExchange, TokenResponse, client_credentials_grant, exchange_code, refresh_token_grant,
    request_token,
};
