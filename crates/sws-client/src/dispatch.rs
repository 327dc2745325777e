//! Error classification and handler hooks
//!
//! Every service owns an `ErrorDispatcher`. A failed request is classified
//! by (HTTP status, service code) into at most one `Hook`, and the handler
//! registered for that hook decides the outcome of the call:
//!
//! | Condition                                   | Hook                      |
//! |---------------------------------------------|---------------------------|
//! | 401/403 with an access-token code           | `InvalidAccessToken`      |
//! | 400 with a refresh-token code               | `InvalidRefreshToken`     |
//! | 403 with the password re-entry code         | `PasswordReEntryRequired` |
//! | 403 with the access-denied code             | `AccessDenied`            |
//! | timeout, no response                        | `TimeoutExceeded`         |
//! | 5xx                                         | `ServiceError`            |
//! | connection refused / unreachable            | `ServiceUnavailable`      |
//!
//! Anything else is returned to the caller unchanged. A hook without a
//! handler re-raises the error; a handler returning `Ok(value)` makes that
//! value the result of the original call.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use sws_auth::codes;
use tracing::debug;

use crate::error::{Failure, ServiceError};
use crate::request::RequestDescriptor;

/// Named classification outcomes with an overridable handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hook {
    InvalidAccessToken,
    InvalidRefreshToken,
    PasswordReEntryRequired,
    AccessDenied,
    TimeoutExceeded,
    ServiceError,
    ServiceUnavailable,
}

impl Hook {
    pub const ALL: [Hook; 7] = [
        Hook::InvalidAccessToken,
        Hook::InvalidRefreshToken,
        Hook::PasswordReEntryRequired,
        Hook::AccessDenied,
        Hook::TimeoutExceeded,
        Hook::ServiceError,
        Hook::ServiceUnavailable,
    ];

    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Hook::InvalidAccessToken => "invalid_access_token",
            Hook::InvalidRefreshToken => "invalid_refresh_token",
            Hook::PasswordReEntryRequired => "password_reentry_required",
            Hook::AccessDenied => "access_denied",
            Hook::TimeoutExceeded => "timeout_exceeded",
            Hook::ServiceError => "service_error",
            Hook::ServiceUnavailable => "service_unavailable",
        }
    }

    /// Classify a failure. First matching row wins; `None` means re-raise.
    pub fn classify(failure: &Failure) -> Option<Hook> {
        match *failure {
            Failure::Status {
                status: 401 | 403,
                code: Some(code),
            } if codes::ACCESS_TOKEN_CODES.contains(&code) => Some(Hook::InvalidAccessToken),
            Failure::Status {
                status: 400,
                code: Some(code),
            } if codes::REFRESH_TOKEN_CODES.contains(&code) => Some(Hook::InvalidRefreshToken),
            Failure::Status {
                status: 403,
                code: Some(codes::PASSWORD_REENTRY_REQUIRED),
            } => Some(Hook::PasswordReEntryRequired),
            Failure::Status {
                status: 403,
                code: Some(codes::ACCESS_DENIED),
            } => Some(Hook::AccessDenied),
            Failure::Timeout => Some(Hook::TimeoutExceeded),
            Failure::Status {
                status: 500..=599,
                ..
            } => Some(Hook::ServiceError),
            Failure::Unreachable(_) => Some(Hook::ServiceUnavailable),
            _ => None,
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Future returned by an error handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, ServiceError>> + Send>>;

/// Handler for one hook: `Ok(value)` recovers the call, `Err` fails it.
pub type ErrorHandler = Arc<dyn Fn(RequestDescriptor, ServiceError) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as an `ErrorHandler`.
///
/// ```ignore
/// client.set_handler(Hook::ServiceError, handler(|_request, _error| async {
///     Ok(serde_json::json!({"degraded": true}))
/// }));
/// ```
pub fn handler<F, Fut>(f: F) -> ErrorHandler
where
    F: Fn(RequestDescriptor, ServiceError) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ServiceError>> + Send + 'static,
{
    Arc::new(move |request, error| Box::pin(f(request, error)))
}

/// Per-service handler registry and dispatch.
pub struct ErrorDispatcher {
    service: &'static str,
    handlers: RwLock<HashMap<Hook, ErrorHandler>>,
}

impl ErrorDispatcher {
    pub fn new(service: &'static str) -> Self {
        Self {
            service,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Register `handler` for `hook`, replacing whatever was there.
    pub fn set_handler(&self, hook: Hook, handler: ErrorHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hook, handler);
    }

    /// Remove the handler for `hook`; the default (re-raise) applies again.
    pub fn clear_handler(&self, hook: Hook) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&hook);
    }

    pub fn handler(&self, hook: Hook) -> Option<ErrorHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&hook)
            .cloned()
    }

    /// Resolve a failed request through the matching hook.
    pub async fn dispatch(
        &self,
        request: RequestDescriptor,
        error: ServiceError,
    ) -> Result<Value, ServiceError> {
        let Some(hook) = Hook::classify(error.failure()) else {
            debug!(service = self.service, error = %error, "unclassified failure, re-raising");
            return Err(error);
        };
        crate::metrics::record_dispatch(self.service, hook);

        match self.handler(hook) {
            Some(handler) => {
                debug!(service = self.service, %hook, "invoking error handler");
                handler(request, error).await
            }
            None => {
                debug!(service = self.service, %hook, "no handler registered, re-raising");
                Err(error)
            }
        }
    }
}

impl fmt::Debug for ErrorDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hooks: Vec<Hook> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        hooks.sort();
        f.debug_struct("ErrorDispatcher")
            .field("service", &self.service)
            .field("hooks", &hooks)
            .finish()
    }
}
