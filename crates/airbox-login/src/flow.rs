//! Authorization-code + PKCE flow driver
//!
//! Executes the I/O behind each `FlowAction`. One `AuthorizationCodeFlow`
//! is one login attempt: it owns a fresh `PkceSession` and at most one
//! callback listener, and is consumed by `run()`.

use std::time::Duration;

use airbox_auth::{
    AuthorizationRequest, CodeExchange, Credentials, Error, Result, exchange_code, now_millis,
};
use provider::Provider;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::BrowserLauncher;
use crate::callback::CallbackServer;
use crate::session::PkceSession;
use crate::state::{FlowEvent, FlowState, handle_event};

/// How long to wait for the user to finish in the browser.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowConfig {
    /// Callback port; 0 lets the OS pick.
    pub port: u16,
    pub timeout: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            port: 0,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl FlowConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn listener_not_running() -> Error {
    Error::CallbackServer("callback listener is not running".into())
}

pub struct AuthorizationCodeFlow<'a> {
    provider: &'a dyn Provider,
    http: reqwest::Client,
    config: FlowConfig,
    session: PkceSession,
    state: FlowState,
    server: Option<CallbackServer>,
}

impl<'a> AuthorizationCodeFlow<'a> {
    pub fn new(provider: &'a dyn Provider, http: reqwest::Client, config: FlowConfig) -> Self {
        Self {
            provider,
            http,
            config,
            session: PkceSession::generate(),
            state: FlowState::Idle,
            server: None,
        }
    }

    /// Replace the generated session (tests, externally chosen state).
    pub fn with_session(mut self, session: PkceSession) -> Self {
        self.session = session;
        self
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn session(&self) -> &PkceSession {
        &self.session
    }

    /// Redirect URI for the running listener.
    pub fn redirect_uri(&self) -> Option<String> {
        self.server.as_ref().map(CallbackServer::redirect_uri)
    }

    fn transition(&mut self, event: FlowEvent) {
        let current = std::mem::replace(&mut self.state, FlowState::Idle);
        let (next, action) = handle_event(current, event);
        debug!(state = ?next, action = ?action, "login flow transition");
        self.state = next;
    }

    /// Bind the callback listener and return the actual port.
    pub async fn start_callback_server(&mut self) -> Result<u16> {
        if let Some(server) = &self.server {
            return Ok(server.port());
        }
        match CallbackServer::start(self.config.port, self.session.state()).await {
            Ok(server) => {
                let port = server.port();
                self.server = Some(server);
                self.transition(FlowEvent::ListenerBound { port });
                Ok(port)
            }
            Err(e) => {
                self.transition(FlowEvent::ListenerFailed);
                Err(e)
            }
        }
    }

    /// Authorization URL for this attempt, or `None` when the provider has
    /// no interactive step. Requires a running listener.
    pub fn auth_url(&self) -> Result<Option<String>> {
        let Some(endpoint) = self.provider.authorization_url_builder() else {
            return Ok(None);
        };
        let redirect_uri = self.redirect_uri().ok_or_else(listener_not_running)?;
        endpoint
            .authorization_url(&AuthorizationRequest {
                redirect_uri: &redirect_uri,
                state: self.session.state(),
                code_challenge: self.session.challenge(),
            })
            .map(Some)
    }

    /// Build the authorization URL and hand it to `launcher`. A launcher
    /// failure only warns; the returned URL can still be opened by hand.
    pub fn send_auth_request(&mut self, launcher: &dyn BrowserLauncher) -> Result<String> {
        let url = self.auth_url()?.ok_or_else(|| {
            Error::Config(format!(
                "provider {} does not support interactive login",
                self.provider.id()
            ))
        })?;
        if let Err(e) = launcher.launch(&url) {
            warn!(error = %e, "failed to open browser");
        }
        self.transition(FlowEvent::AuthRequestSent);
        Ok(url)
    }

    /// Wait for the first of: code, callback error, cancellation, timeout.
    ///
    /// The listener keeps running afterwards; `close()` (or `run()`) stops it.
    pub async fn wait_for_callback(
        &mut self,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<String> {
        let (code_rx, error_rx) = self
            .server
            .as_mut()
            .and_then(CallbackServer::take_receivers)
            .ok_or_else(listener_not_running)?;
        self.transition(FlowEvent::WaitStarted);
        info!(timeout = ?timeout, "waiting for authorization callback");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            code = code_rx => code.map_err(|_| listener_not_running()),
            error = error_rx => Err(error.unwrap_or_else(|_| listener_not_running())),
            _ = tokio::time::sleep(timeout) => Err(Error::Timeout(timeout)),
        };

        let event = match &outcome {
            Ok(_) => FlowEvent::CodeReceived,
            Err(Error::Cancelled) => FlowEvent::Cancelled,
            Err(Error::Timeout(_)) => FlowEvent::TimerElapsed,
            Err(_) => FlowEvent::CallbackFailed,
        };
        self.transition(event);
        outcome
    }

    /// Redeem `code` with this attempt's verifier and redirect URI.
    ///
    /// Tokens without a positive `expires_in` are rejected.
    pub async fn exchange(&mut self, code: &str, cancel: &CancellationToken) -> Result<Credentials> {
        self.transition(FlowEvent::ExchangeStarted);
        let result = self.redeem(code, cancel).await;
        let event = match &result {
            Ok(_) => FlowEvent::ExchangeSucceeded,
            Err(Error::Cancelled) => FlowEvent::Cancelled,
            Err(_) => FlowEvent::ExchangeFailed,
        };
        self.transition(event);
        result
    }

    async fn redeem(&self, code: &str, cancel: &CancellationToken) -> Result<Credentials> {
        let endpoint = self.provider.authorization_url_builder().ok_or_else(|| {
            Error::Config(format!(
                "provider {} does not support interactive login",
                self.provider.id()
            ))
        })?;
        let redirect_uri = self.redirect_uri().ok_or_else(listener_not_running)?;

        let response = exchange_code(
            &self.http,
            self.provider.token_endpoint(),
            &CodeExchange {
                client_id: endpoint.client_id(),
                code,
                redirect_uri: &redirect_uri,
                code_verifier: self.session.verifier(),
            },
            cancel,
        )
        .await?;

        if !response.expires_in.is_some_and(|secs| secs > 0) {
            warn!("token endpoint returned a token without expiration");
            return Err(Error::MissingExpiry);
        }
        info!(
            has_refresh_token = response.refresh_token.is_some(),
            "authorization code exchanged"
        );
        Ok(Credentials::from_token_response(response, now_millis()))
    }

    /// Stop the callback listener. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.shutdown().await;
        }
    }

    /// Run the whole attempt. The listener is closed on every exit path.
    pub async fn run(
        mut self,
        launcher: &dyn BrowserLauncher,
        cancel: &CancellationToken,
    ) -> Result<Credentials> {
        let result = self.drive(launcher, cancel).await;
        self.close().await;
        result
    }

    async fn drive(
        &mut self,
        launcher: &dyn BrowserLauncher,
        cancel: &CancellationToken,
    ) -> Result<Credentials> {
        self.start_callback_server().await?;
        self.send_auth_request(launcher)?;
        let code = self.wait_for_callback(cancel, self.config.timeout).await?;
        self.exchange(&code, cancel).await
    }
}

/// Interactive login: run one flow and hand the credentials to `provider`,
/// which adopts and persists them.
pub async fn login(
    provider: &dyn Provider,
    http: reqwest::Client,
    config: FlowConfig,
    launcher: &dyn BrowserLauncher,
    cancel: &CancellationToken,
) -> provider::Result<Credentials> {
    let credentials = AuthorizationCodeFlow::new(provider, http, config)
        .run(launcher, cancel)
        .await?;
    provider.save_credentials(credentials.clone()).await?;
    info!(provider = provider.id(), "login complete");
    Ok(credentials)
}
