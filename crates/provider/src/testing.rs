//! Stub token and API servers shared by the provider tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral port and return its base URL.
pub(crate) async fn spawn_stub(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Token endpoint at `/token` that hands out `tok-1`, `tok-2`, ... and
/// records every grant type it sees.
#[derive(Clone, Default)]
pub(crate) struct TokenStub {
    calls: Arc<AtomicUsize>,
    grants: Arc<Mutex<Vec<String>>>,
    forms: Arc<Mutex<Vec<HashMap<String, String>>>>,
    delay: Duration,
    reject: bool,
}

impl TokenStub {
    /// Delay every response, so concurrent callers overlap.
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Answer every request with an OAuth2 `invalid_client` error.
    pub(crate) fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub(crate) fn router(&self) -> Router {
        Router::new()
            .route("/token", post(token_handler))
            .with_state(self.clone())
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn grants(&self) -> Vec<String> {
        self.grants.lock().unwrap().clone()
    }

    pub(crate) fn forms(&self) -> Vec<HashMap<String, String>> {
        self.forms.lock().unwrap().clone()
    }
}

async fn token_handler(
    State(stub): State<TokenStub>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let n = stub.calls.fetch_add(1, Ordering::SeqCst) + 1;
    stub.grants
        .lock()
        .unwrap()
        .push(form.get("grant_type").cloned().unwrap_or_default());
    stub.forms.lock().unwrap().push(form);

    if !stub.delay.is_zero() {
        tokio::time::sleep(stub.delay).await;
    }

    if stub.reject {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "Invalid client credentials",
            })),
        );
    }

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "access_token": format!("tok-{n}"),
            "token_type": "Bearer",
            "expires_in": 3600,
        })),
    )
}

/// API endpoint at `/api` that records the Authorization header of every
/// request and answers 200 only when `accept` approves it, 401 otherwise.
#[derive(Clone)]
pub(crate) struct ApiStub {
    seen: Arc<Mutex<Vec<String>>>,
    accept: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl ApiStub {
    pub(crate) fn accepting(accept: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
            accept: Arc::new(accept),
        }
    }

    pub(crate) fn router(&self) -> Router {
        Router::new()
            .route("/api", get(api_handler))
            .with_state(self.clone())
    }

    pub(crate) fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

async fn api_handler(State(stub): State<ApiStub>, headers: HeaderMap) -> StatusCode {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let accepted = (stub.accept)(&authorization);
    stub.seen.lock().unwrap().push(authorization);
    if accepted {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    }
}
