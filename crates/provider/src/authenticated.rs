//! Authenticated transport: token injection, renewal, and 401 retry
//!
//! Wraps a plain `HttpTransport`. Before every request the current token is
//! checked and renewed if expired; the renewal is a critical section so
//! concurrent callers share a single token request:
//!
//! 1. Read lock: if the token is still valid, use it.
//! 2. Write lock: re-check, since another caller may have renewed while we
//!    waited. Only if it is still expired, fetch + persist + publish.
//!
//! A 401 from the API invalidates the token (persisting an expired
//! placeholder), forces one renewal, and retries the request exactly once.
//! Whatever the retry returns goes back to the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use airbox_auth::{CredentialStore, Credentials};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::source::TokenSource;
use crate::transport::HttpTransport;
use crate::{ProviderError, Result};

/// `HttpTransport` decorator that keeps a valid bearer token on every request.
pub struct AuthenticatedTransport {
    inner: Arc<dyn HttpTransport>,
    source: Box<dyn TokenSource>,
    store: Arc<dyn CredentialStore>,
    credentials: RwLock<Option<Credentials>>,
    cancel: CancellationToken,
}

impl AuthenticatedTransport {
    /// Create a transport seeded with `initial` credentials (may be `None`,
    /// in which case the first request fetches from `source`).
    pub fn new(
        inner: Arc<dyn HttpTransport>,
        source: Box<dyn TokenSource>,
        store: Arc<dyn CredentialStore>,
        initial: Option<Credentials>,
    ) -> Self {
        Self {
            inner,
            source,
            store,
            credentials: RwLock::new(initial),
            cancel: CancellationToken::new(),
        }
    }

    /// Abort token requests and in-flight API calls when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn token_endpoint(&self) -> &str {
        self.source.token_endpoint()
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Credentials currently held in memory, valid or not.
    pub async fn current(&self) -> Option<Credentials> {
        self.credentials.read().await.clone()
    }

    /// Persist `credentials` and make them the ones used for requests.
    pub async fn replace(&self, credentials: Credentials) -> Result<()> {
        let mut guard = self.credentials.write().await;
        self.store.save(&credentials).await?;
        *guard = Some(credentials);
        Ok(())
    }

    /// Return unexpired credentials, renewing them at most once across all
    /// concurrent callers.
    pub async fn valid_credentials(&self) -> Result<Credentials> {
        {
            let guard = self.credentials.read().await;
            if let Some(creds) = guard.as_ref()
                && !creds.is_expired()
            {
                return Ok(creds.clone());
            }
        }

        let mut guard = self.credentials.write().await;
        if let Some(creds) = guard.as_ref()
            && !creds.is_expired()
        {
            debug!(source = self.source.name(), "token renewed by concurrent caller");
            return Ok(creds.clone());
        }

        let fresh = self.fetch_and_persist(guard.as_ref()).await?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    /// Discard `stale_access_token` after the API rejected it and renew.
    ///
    /// If a concurrent caller already replaced that token, the replacement
    /// is returned without another token request.
    pub async fn invalidate_and_refresh(&self, stale_access_token: &str) -> Result<Credentials> {
        let mut guard = self.credentials.write().await;
        if let Some(creds) = guard.as_ref()
            && creds.access_token != stale_access_token
            && !creds.is_expired()
        {
            debug!(source = self.source.name(), "rejected token already replaced");
            return Ok(creds.clone());
        }

        let expired = guard.as_ref().map(Credentials::expired);
        if let Some(placeholder) = expired.as_ref() {
            self.store.save(placeholder).await?;
        }
        *guard = expired;

        let fresh = self.fetch_and_persist(guard.as_ref()).await?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    /// Caller must hold the write lock.
    async fn fetch_and_persist(&self, current: Option<&Credentials>) -> Result<Credentials> {
        let source = self.source.name();
        metrics::counter!("airbox_token_refresh_total", "source" => source).increment(1);

        let fresh = match self.source.fetch(current, &self.cancel).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(source, error = %e, "token renewal failed");
                metrics::counter!("airbox_token_refresh_failures_total", "source" => source)
                    .increment(1);
                return Err(e.into());
            }
        };

        self.store.save(&fresh).await?;
        info!(source, expires_at = ?fresh.expires_at, "token renewed");
        Ok(fresh)
    }

    async fn dispatch(
        &self,
        mut request: reqwest::Request,
        credentials: &Credentials,
    ) -> Result<reqwest::Response> {
        let mut value = HeaderValue::from_str(&credentials.authorization_header())
            .map_err(|e| ProviderError::InvalidHeader(e.to_string()))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(airbox_auth::Error::Cancelled.into()),
            result = self.inner.send(request) => result,
        }
    }

    async fn send_authenticated(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let credentials = self.valid_credentials().await?;
        let retry = request.try_clone();
        let url = request.url().clone();

        let response = self.dispatch(request, &credentials).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(retry) = retry else {
            warn!(url = %url, "request unauthorized and body cannot be replayed, not retrying");
            return Ok(response);
        };
        // Release the connection before renewing.
        drop(response);

        warn!(url = %url, "request unauthorized, renewing token and retrying once");
        let renewed = self
            .invalidate_and_refresh(&credentials.access_token)
            .await?;
        self.dispatch(retry, &renewed).await
    }
}

impl HttpTransport for AuthenticatedTransport {
    fn send(
        &self,
        request: reqwest::Request,
    ) -> Pin<Box<dyn Future<Output = Result<reqwest::Response>> + Send + '_>> {
        Box::pin(self.send_authenticated(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RefreshTokenSource;
    use crate::testing::{ApiStub, TokenStub, spawn_stub};
    use airbox_auth::{MemoryCredentialStore, now_millis};
    use std::time::Duration;

    fn credentials(access: &str, refresh: Option<&str>, expires_at: u64) -> Credentials {
        Credentials {
            access_token: access.into(),
            refresh_token: refresh.map(Into::into),
            token_type: "Bearer".into(),
            expires_at: Some(expires_at),
        }
    }

    fn valid(access: &str) -> Credentials {
        credentials(access, Some("rt"), now_millis() + 3_600_000)
    }

    fn expired(access: &str) -> Credentials {
        credentials(access, Some("rt"), 1)
    }

    struct Harness {
        transport: Arc<AuthenticatedTransport>,
        store: Arc<MemoryCredentialStore>,
        tokens: TokenStub,
        api: ApiStub,
        api_url: String,
    }

    async fn harness(initial: Credentials, tokens: TokenStub, api: ApiStub) -> Harness {
        let token_base = spawn_stub(tokens.router()).await;
        let api_base = spawn_stub(api.router()).await;
        let store = Arc::new(MemoryCredentialStore::with_credentials(initial.clone()));
        let http = reqwest::Client::new();
        let source =
            RefreshTokenSource::new(http.clone(), format!("{token_base}/token"), "airbox".into());
        let transport = AuthenticatedTransport::new(
            Arc::new(http),
            Box::new(source),
            store.clone(),
            Some(initial),
        );
        Harness {
            transport: Arc::new(transport),
            store,
            tokens,
            api,
            api_url: format!("{api_base}/api"),
        }
    }

    fn get(url: &str) -> reqwest::Request {
        reqwest::Client::new().get(url).build().unwrap()
    }

    #[tokio::test]
    async fn valid_token_is_injected_without_refresh() {
        let h = harness(valid("old"), TokenStub::default(), ApiStub::accepting(|_| true)).await;

        let response = h.transport.send(get(&h.api_url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.api.seen(), vec!["Bearer old"]);
        assert_eq!(h.tokens.calls(), 0);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let h = harness(expired("old"), TokenStub::default(), ApiStub::accepting(|_| true)).await;

        let response = h.transport.send(get(&h.api_url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.api.seen(), vec!["Bearer tok-1"]);
        assert_eq!(h.tokens.grants(), vec!["refresh_token"]);

        let stored = h.store.load().await.unwrap().unwrap();
        assert_eq!(stored.access_token, "tok-1");
        assert_eq!(stored.refresh_token.as_deref(), Some("rt"));
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_refresh() {
        let h = harness(
            expired("old"),
            TokenStub::with_delay(Duration::from_millis(100)),
            ApiStub::accepting(|_| true),
        )
        .await;

        let mut handles = vec![];
        for _ in 0..2 {
            let transport = h.transport.clone();
            let url = h.api_url.clone();
            handles.push(tokio::spawn(async move {
                transport.send(get(&url)).await.unwrap().status()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), StatusCode::OK);
        }

        assert_eq!(h.tokens.calls(), 1, "exactly one network refresh");
        assert_eq!(h.api.seen(), vec!["Bearer tok-1", "Bearer tok-1"]);
    }

    #[tokio::test]
    async fn unauthorized_triggers_one_refresh_and_retry() {
        let h = harness(
            valid("old"),
            TokenStub::default(),
            ApiStub::accepting(|auth| auth == "Bearer tok-1"),
        )
        .await;

        let response = h.transport.send(get(&h.api_url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.api.seen(), vec!["Bearer old", "Bearer tok-1"]);
        assert_eq!(h.tokens.calls(), 1);
        // expired placeholder, then the renewed token
        assert_eq!(h.store.save_count(), 2);
        assert_eq!(
            h.store.load().await.unwrap().unwrap().access_token,
            "tok-1"
        );
    }

    #[tokio::test]
    async fn second_unauthorized_is_returned_without_third_attempt() {
        let h = harness(valid("old"), TokenStub::default(), ApiStub::accepting(|_| false)).await;

        let response = h.transport.send(get(&h.api_url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(h.api.seen().len(), 2);
        assert_eq!(h.tokens.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_unauthorized_share_one_refresh() {
        let h = harness(
            valid("old"),
            TokenStub::with_delay(Duration::from_millis(100)),
            ApiStub::accepting(|auth| auth == "Bearer tok-1"),
        )
        .await;

        let mut handles = vec![];
        for _ in 0..2 {
            let transport = h.transport.clone();
            let url = h.api_url.clone();
            handles.push(tokio::spawn(async move {
                transport.send(get(&url)).await.unwrap().status()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), StatusCode::OK);
        }

        assert_eq!(h.tokens.calls(), 1);
    }

    #[tokio::test]
    async fn expired_without_refresh_token_fails_before_request() {
        let h = harness(
            credentials("old", None, 1),
            TokenStub::default(),
            ApiStub::accepting(|_| true),
        )
        .await;

        let err = h.transport.send(get(&h.api_url)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "access token expired and no refresh token available"
        );
        assert!(h.api.seen().is_empty());
        assert_eq!(h.tokens.calls(), 0);
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_token_endpoint_error() {
        let h = harness(expired("old"), TokenStub::rejecting(), ApiStub::accepting(|_| true)).await;

        let err = h.transport.send(get(&h.api_url)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to authenticate: invalid_client - invalid client credentials"
        );
        assert!(h.api.seen().is_empty());
    }

    #[tokio::test]
    async fn cancelled_transport_returns_cancellation_error() {
        let h = harness(valid("old"), TokenStub::default(), ApiStub::accepting(|_| true)).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let transport = Arc::try_unwrap(h.transport)
            .ok()
            .unwrap()
            .with_cancellation(cancel);
        let err = transport.send(get(&h.api_url)).await.unwrap_err();
        assert!(
            matches!(err, ProviderError::Auth(airbox_auth::Error::Cancelled)),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn replace_publishes_and_persists() {
        let h = harness(expired("old"), TokenStub::default(), ApiStub::accepting(|_| true)).await;

        h.transport.replace(valid("manual")).await.unwrap();
        assert_eq!(h.transport.current().await.unwrap().access_token, "manual");
        assert_eq!(
            h.store.load().await.unwrap().unwrap().access_token,
            "manual"
        );

        h.transport.send(get(&h.api_url)).await.unwrap();
        assert_eq!(h.api.seen(), vec!["Bearer manual"]);
        assert_eq!(h.tokens.calls(), 0);
    }
}
