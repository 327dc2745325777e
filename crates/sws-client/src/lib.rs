//! Client SDK for the SWS web services
//!
//! Exposes the identity, licensing, commerce, profile, notifications,
//! rewards and assets services behind one `SwsClient`. Each service sends
//! requests through a shared `Transport` and resolves failures through its
//! own `ErrorDispatcher`.
//!
//! Request flow:
//! 1. A service builds a `RequestDescriptor` with the live bearer token
//! 2. `Service::fetch` sends it once through the `Transport`
//! 3. On failure the dispatcher classifies the error into a `Hook`
//! 4. The hook's handler decides the result; for an invalid access token the
//!    default handler joins a single-flight refresh and replays the request
//!    once with the new token
//!
//! ```ignore
//! let client = SwsClient::load(None).await?;
//! client.set_service_error_handler(handler(|_request, _error| async {
//!     Ok(serde_json::json!({"degraded": true}))
//! }));
//! let licenses = client.licensing().get("/api/v2/licenses", None).await?;
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod request;
pub mod retry;
pub mod service;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::SwsClient;
pub use config::ClientConfig;
pub use dispatch::{ErrorDispatcher, ErrorHandler, Hook, handler};
pub use error::{Error, Failure, RawResponse, Result, ServiceError};
pub use identity::IdentityService;
pub use request::{Method, RequestDescriptor};
pub use retry::{RefreshState, RetryCoordinator, TokenRefresher};
pub use service::{Service, ServiceKind};
pub use transport::{HttpTransport, Transport};

pub use sws_auth::{
    Credentials, Session, SessionStore, TokenUpdate, TokenUpdatedHandler, token_updated_handler,
};
