//! Token refresh response model and the token-updated callback
//!
//! The identity service answers a refresh with
//! `{"access": {"token", "expires_at"}, "refresh": {"token", "expires_at"}}`.
//! A body that does not carry a non-empty access token is not a usable
//! refresh result: it is whatever a custom error handler recovered the
//! failed refresh into, and is passed through to callers unchanged.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Token expiry as reported by the identity service.
///
/// Depending on the deployment this is either a unix timestamp or an
/// RFC 3339 string; both are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpiresAt {
    Epoch(i64),
    Timestamp(String),
}

impl fmt::Display for ExpiresAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiresAt::Epoch(secs) => write!(f, "{secs}"),
            ExpiresAt::Timestamp(ts) => f.write_str(ts),
        }
    }
}

/// One issued token with its expiry.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<ExpiresAt>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Successful response body of the identity token endpoint.
///
/// `refresh` is optional: when the service does not rotate the refresh
/// token, the current one stays in use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRefreshResponse {
    pub access: TokenGrant,
    #[serde(default)]
    pub refresh: Option<TokenGrant>,
}

impl TokenRefreshResponse {
    /// Interpret a resolved identity response as a refresh result.
    ///
    /// Returns `None` when the value does not carry a non-empty access token.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let response: TokenRefreshResponse = serde_json::from_value(value.clone()).ok()?;
        if response.access.token.is_empty() {
            return None;
        }
        Some(response)
    }
}

/// New credentials handed to the token-updated callback after a refresh
/// has been committed.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenUpdate {
    pub access_token: String,
    pub access_token_expires_at: Option<ExpiresAt>,
    pub refresh_token: String,
    pub refresh_token_expires_at: Option<ExpiresAt>,
}

impl fmt::Debug for TokenUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenUpdate")
            .field("access_token", &"[REDACTED]")
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("refresh_token", &"[REDACTED]")
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .finish()
    }
}

/// Callback invoked once per successful token refresh.
pub type TokenUpdatedHandler =
    Arc<dyn Fn(TokenUpdate) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Wrap an async closure as a `TokenUpdatedHandler`.
pub fn token_updated_handler<F, Fut>(f: F) -> TokenUpdatedHandler
where
    F: Fn(TokenUpdate) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |update| Box::pin(f(update)))
}
