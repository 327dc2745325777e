//! Network transport
//!
//! A `Transport` performs exactly one HTTP exchange for a
//! `RequestDescriptor`. It never retries and never recovers: every non-2xx
//! response, timeout or connection failure comes back as a `ServiceError`
//! for the dispatcher to classify.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Failure, Result, ServiceError};
use crate::request::RequestDescriptor;

/// Future returned by `Transport::send`.
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<Value, ServiceError>> + Send + 'a>>;

/// Performs one HTTP call and returns the parsed JSON body.
///
/// Uses `Pin<Box<dyn Future>>` so the transport can be shared as
/// `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: &'a RequestDescriptor) -> TransportFuture<'a>;
}

/// reqwest-backed transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("sws-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Http(format!("building HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    /// Use an existing reqwest client (shared connection pool, custom TLS).
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn execute(&self, request: &RequestDescriptor) -> std::result::Result<Value, ServiceError> {
        let mut builder = self
            .client
            .request(request.method().into(), request.url())
            .timeout(self.timeout);
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_string());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ServiceError::new(classify_reqwest_error(&e), request.clone(), None))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::new(classify_reqwest_error(&e), request.clone(), None))?;

        if !status.is_success() {
            debug!(status = status.as_u16(), url = request.url(), "request returned error status");
            return Err(ServiceError::from_status(request.clone(), status.as_u16(), text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            ServiceError::new(
                Failure::Decode(e.to_string()),
                request.clone(),
                Some(crate::error::RawResponse {
                    status: status.as_u16(),
                    body: text.clone(),
                }),
            )
        })
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, request: &'a RequestDescriptor) -> TransportFuture<'a> {
        Box::pin(self.execute(request))
    }
}

/// Map a reqwest error onto the failure taxonomy.
fn classify_reqwest_error(error: &reqwest::Error) -> Failure {
    if error.is_timeout() {
        Failure::Timeout
    } else if error.is_connect() {
        Failure::Unreachable(error.to_string())
    } else {
        Failure::Transport(error.to_string())
    }
}
