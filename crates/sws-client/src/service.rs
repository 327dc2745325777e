//! Per-service request primitive
//!
//! A `Service` is one logical SWS endpoint group sharing a base URL and an
//! `ErrorDispatcher`. Every call funnels through `fetch`: send once, and on
//! failure hand the error to the dispatcher, whose result is final.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use sws_auth::{AuthHeaders, Credentials};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::dispatch::{ErrorDispatcher, ErrorHandler, Hook};
use crate::error::ServiceError;
use crate::metrics::{self, Outcome};
use crate::request::{Method, RequestDescriptor};
use crate::transport::Transport;

/// The SWS service groups exposed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Identity,
    Licensing,
    Commerce,
    Profile,
    Notifications,
    Rewards,
    Assets,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 7] = [
        ServiceKind::Identity,
        ServiceKind::Licensing,
        ServiceKind::Commerce,
        ServiceKind::Profile,
        ServiceKind::Notifications,
        ServiceKind::Rewards,
        ServiceKind::Assets,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::Identity => "identity",
            ServiceKind::Licensing => "licensing",
            ServiceKind::Commerce => "commerce",
            ServiceKind::Profile => "profile",
            ServiceKind::Notifications => "notifications",
            ServiceKind::Rewards => "rewards",
            ServiceKind::Assets => "assets",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One service client: base URL, shared transport and credentials, and its
/// own handler registry.
pub struct Service {
    kind: ServiceKind,
    base_url: String,
    transport: Arc<dyn Transport>,
    headers: AuthHeaders,
    credentials: Arc<Credentials>,
    dispatcher: Arc<ErrorDispatcher>,
}

impl Service {
    pub fn new(
        kind: ServiceKind,
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        credentials: Arc<Credentials>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            kind,
            base_url,
            transport,
            headers: AuthHeaders::new(credentials.clone()),
            credentials,
            dispatcher: Arc::new(ErrorDispatcher::new(kind.name())),
        }
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn dispatcher(&self) -> &Arc<ErrorDispatcher> {
        &self.dispatcher
    }

    /// User id for paths that address a user; 0 means the token's owner.
    pub fn user_id(&self) -> u64 {
        self.credentials.user_id()
    }

    /// Absolute URL for a path under this service.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Request authorized with the live access token.
    pub fn bearer_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Map<String, Value>>,
    ) -> RequestDescriptor {
        RequestDescriptor::new(
            method,
            self.url(path),
            body,
            Some(self.headers.bearer_header()),
        )
    }

    /// Request authorized with the app id/secret pair. A token refresh cannot
    /// repair a rejected Basic credential, so these are never retried.
    pub fn basic_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Map<String, Value>>,
    ) -> RequestDescriptor {
        RequestDescriptor::new(
            method,
            self.url(path),
            body,
            Some(self.headers.basic_header()),
        )
        .without_token_retry()
    }

    /// Send `request` once; on failure the dispatcher decides the outcome.
    #[instrument(
        skip_all,
        fields(
            service = self.kind.name(),
            method = %request.method(),
            call_id = %Uuid::new_v4(),
        )
    )]
    pub async fn fetch(&self, request: RequestDescriptor) -> Result<Value, ServiceError> {
        match self.transport.send(&request).await {
            Ok(value) => {
                metrics::record_request(self.kind.name(), Outcome::Ok);
                Ok(value)
            }
            Err(error) => {
                debug!(error = %error, "request failed, dispatching");
                let result = self.dispatcher.dispatch(request, error).await;
                let outcome = if result.is_ok() {
                    Outcome::Recovered
                } else {
                    Outcome::Failed
                };
                metrics::record_request(self.kind.name(), outcome);
                result
            }
        }
    }

    /// GET with `query` encoded into the URL.
    pub async fn get(
        &self,
        path: &str,
        query: Option<Map<String, Value>>,
    ) -> Result<Value, ServiceError> {
        self.fetch(self.bearer_request(Method::Get, path, query)).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: Option<Map<String, Value>>,
    ) -> Result<Value, ServiceError> {
        self.fetch(self.bearer_request(Method::Post, path, body)).await
    }

    pub async fn put(
        &self,
        path: &str,
        body: Option<Map<String, Value>>,
    ) -> Result<Value, ServiceError> {
        self.fetch(self.bearer_request(Method::Put, path, body)).await
    }

    pub async fn delete(
        &self,
        path: &str,
        body: Option<Map<String, Value>>,
    ) -> Result<Value, ServiceError> {
        self.fetch(self.bearer_request(Method::Delete, path, body)).await
    }

    /// Set the handler for one hook on this service only.
    pub fn set_handler(&self, hook: Hook, handler: ErrorHandler) {
        self.dispatcher.set_handler(hook, handler);
    }

    /// Drop this service's handler for `hook`; the error is re-raised again.
    pub fn clear_handler(&self, hook: Hook) {
        self.dispatcher.clear_handler(hook);
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
