//! Minimal HTTP transport capability

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{ProviderError, Result};

/// Anything that can execute a prepared request.
///
/// `reqwest::Client` is the production implementation; providers wrap any
/// implementation to add authentication.
pub trait HttpTransport: Send + Sync {
    fn send(
        &self,
        request: reqwest::Request,
    ) -> Pin<Box<dyn Future<Output = Result<reqwest::Response>> + Send + '_>>;
}

impl HttpTransport for reqwest::Client {
    fn send(
        &self,
        request: reqwest::Request,
    ) -> Pin<Box<dyn Future<Output = Result<reqwest::Response>> + Send + '_>> {
        Box::pin(async move {
            self.execute(request)
                .await
                .map_err(|e| ProviderError::Request(e.to_string()))
        })
    }
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn send(
        &self,
        request: reqwest::Request,
    ) -> Pin<Box<dyn Future<Output = Result<reqwest::Response>> + Send + '_>> {
        (**self).send(request)
    }
}
