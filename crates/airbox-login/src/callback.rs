//! Local OAuth callback server
//!
//! Receives the browser redirect at `/callback`, validates the state token,
//! and delivers exactly one outcome to the waiting flow: a code on the code
//! channel or an error on the error channel. Requests after the first
//! outcome get 409 and deliver nothing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use airbox_auth::{CALLBACK_PATH, Error, Result};
use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SUCCESS_PAGE: &str = include_str!("../assets/success.html");

/// Upper bound on waiting for in-flight callback responses during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Redirect URI registered with the issuer for a callback port.
pub fn redirect_uri(port: u16) -> String {
    format!("http://localhost:{port}{CALLBACK_PATH}")
}

/// Query parameters the issuer appends to the redirect.
#[derive(Debug, Default)]
pub(crate) struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    /// Collects the known parameters. `None` if any of them is repeated.
    fn from_pairs(pairs: Vec<(String, String)>) -> Option<Self> {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.replace(value).is_some() {
                return None;
            }
        }
        Some(params)
    }
}

/// Senders for the two outcome channels. Only one is ever used; the other
/// stays alive until the server stops so the waiting side can tell "no
/// outcome yet" from "server gone".
struct Outcome {
    delivered: bool,
    code_tx: Option<oneshot::Sender<String>>,
    error_tx: Option<oneshot::Sender<Error>>,
}

#[derive(Clone)]
pub(crate) struct CallbackState {
    expected_state: Arc<str>,
    outcome: Arc<Mutex<Outcome>>,
}

impl CallbackState {
    pub(crate) fn new(
        expected_state: &str,
        code_tx: oneshot::Sender<String>,
        error_tx: oneshot::Sender<Error>,
    ) -> Self {
        Self {
            expected_state: Arc::from(expected_state),
            outcome: Arc::new(Mutex::new(Outcome {
                delivered: false,
                code_tx: Some(code_tx),
                error_tx: Some(error_tx),
            })),
        }
    }

    /// Claims the single delivery slot; `None` if already claimed.
    fn claim(&self) -> Option<std::sync::MutexGuard<'_, Outcome>> {
        let mut outcome = self.outcome.lock().unwrap_or_else(|p| p.into_inner());
        if outcome.delivered {
            return None;
        }
        outcome.delivered = true;
        Some(outcome)
    }

    fn deliver_code(&self, code: String) -> bool {
        match self.claim() {
            Some(mut outcome) => {
                if let Some(tx) = outcome.code_tx.take() {
                    let _ = tx.send(code);
                }
                true
            }
            None => false,
        }
    }

    fn deliver_error(&self, error: Error) -> bool {
        match self.claim() {
            Some(mut outcome) => {
                if let Some(tx) = outcome.error_tx.take() {
                    let _ = tx.send(error);
                }
                true
            }
            None => false,
        }
    }
}

pub(crate) fn build_router(state: CallbackState) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(handle_callback))
        .with_state(state)
}

async fn handle_callback(
    State(state): State<CallbackState>,
    query: std::result::Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Response {
    // An unreadable query or a repeated parameter counts as a state mismatch.
    let params = match query {
        Ok(Query(pairs)) => CallbackParams::from_pairs(pairs),
        Err(rejection) => {
            warn!(error = %rejection, "unreadable callback query");
            None
        }
    };
    let Some(params) = params else {
        warn!("ambiguous callback query");
        return reject(&state, Error::InvalidState);
    };

    // State first: a mismatched redirect never delivers a code.
    if params.state.as_deref() != Some(&*state.expected_state) {
        warn!("callback state mismatch");
        return reject(&state, Error::InvalidState);
    }

    if let Some(error) = params.error {
        warn!(error = %error, "authorization server returned an error");
        return reject(
            &state,
            Error::AuthorizationDenied {
                error,
                description: params.error_description.unwrap_or_default(),
            },
        );
    }

    let Some(code) = params.code.filter(|code| !code.is_empty()) else {
        return reject(&state, Error::MissingCode);
    };

    if !state.deliver_code(code) {
        return already_completed();
    }
    info!("authorization code received");
    (StatusCode::OK, Html(SUCCESS_PAGE)).into_response()
}

fn reject(state: &CallbackState, error: Error) -> Response {
    let page = failure_page(&error.to_string());
    if !state.deliver_error(error) {
        return already_completed();
    }
    (StatusCode::BAD_REQUEST, Html(page)).into_response()
}

fn already_completed() -> Response {
    debug!("ignoring callback after completion");
    (
        StatusCode::CONFLICT,
        Html(failure_page("This login attempt has already completed.")),
    )
        .into_response()
}

fn failure_page(message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Airbox login failed</title></head>\
         <body><h1>Authentication failed</h1><p>{}</p>\
         <p>Return to your terminal and try again.</p></body></html>",
        html_escape::encode_text(message)
    )
}

/// Running callback listener for one login attempt.
///
/// Dropping the server signals shutdown without waiting; call `shutdown()`
/// to also wait for in-flight responses.
pub struct CallbackServer {
    port: u16,
    code_rx: Option<oneshot::Receiver<String>>,
    error_rx: Option<oneshot::Receiver<Error>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind `127.0.0.1:port` (0 = OS-assigned) and start serving.
    pub async fn start(port: u16, expected_state: &str) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| Error::CallbackServer(format!("binding port {port}: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::CallbackServer(e.to_string()))?
            .port();

        let (code_tx, code_rx) = oneshot::channel();
        let (error_tx, error_rx) = oneshot::channel();
        let app = build_router(CallbackState::new(expected_state, code_tx, error_tx));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "callback server error");
            }
        });

        info!(port, "callback server listening");
        Ok(Self {
            port,
            code_rx: Some(code_rx),
            error_rx: Some(error_rx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> String {
        redirect_uri(self.port)
    }

    /// Code and error receivers. Available once; `None` afterwards.
    pub fn take_receivers(
        &mut self,
    ) -> Option<(oneshot::Receiver<String>, oneshot::Receiver<Error>)> {
        Some((self.code_rx.take()?, self.error_rx.take()?))
    }

    /// Stop accepting connections and wait briefly for in-flight responses.
    /// Idempotent.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                warn!("callback server did not drain in time, aborting");
                handle.abort();
            }
            debug!(port = self.port, "callback server stopped");
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
