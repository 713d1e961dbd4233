//! Interactive browser login (OIDC authorization code + PKCE)
//!
//! Runs a short-lived callback server on localhost, sends the user's
//! browser to the issuer, waits for the redirect, and exchanges the code
//! for tokens. Each login attempt owns its own verifier, state token,
//! channels and listener; nothing is shared between attempts.
//!
//! Login sequence:
//! 1. `CallbackServer::start()` binds the listener (port 0 = OS-assigned)
//! 2. `AuthorizationCodeFlow::send_auth_request()` opens the browser
//! 3. `AuthorizationCodeFlow::wait_for_callback()` races code, error,
//!    cancellation and timeout
//! 4. `AuthorizationCodeFlow::exchange()` redeems the code with the verifier
//! 5. `login()` hands the credentials to the provider, which persists them

pub mod browser;
pub mod callback;
pub mod flow;
pub mod session;
pub mod state;

pub use browser::{BrowserLauncher, ManualBrowser, SystemBrowser};
pub use callback::{CallbackServer, redirect_uri};
pub use flow::{AuthorizationCodeFlow, FlowConfig, login};
pub use session::PkceSession;
pub use state::{FailureReason, FlowAction, FlowEvent, FlowState, handle_event};
