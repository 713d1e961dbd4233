//! Airbox OAuth constants
//!
//! Fixed paths and protocol values shared by the OAuth2 client-credentials
//! path and the OIDC authorization-code path.

/// Path of the local callback handler used as the OIDC redirect target.
pub const CALLBACK_PATH: &str = "/callback";

/// Scopes requested during the interactive login. `offline_access` is what
/// makes the issuer hand out a refresh token.
pub const DEFAULT_SCOPES: &str = "openid profile email offline_access";

/// Tokens are treated as expired this long before their stated expiry to
/// absorb clock drift and request latency.
pub const EXPIRY_SKEW_MILLIS: u64 = 60_000;

/// Token endpoint path for Airbyte application (client-credentials) tokens,
/// relative to the API base URL.
pub const OAUTH2_TOKEN_PATH: &str = "/v1/applications/token";

/// Well-known OIDC discovery document path, relative to the issuer.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Token type assumed when the token endpoint omits one.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";
