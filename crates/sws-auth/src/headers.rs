//! Authorization header values
//!
//! Both values are computed from the live credential state on every call.
//! Nothing is cached, so a request built after a refresh carries the new
//! access token.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::credentials::Credentials;

/// Builds `Basic` and `Bearer` authorization header values.
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    credentials: Arc<Credentials>,
}

impl AuthHeaders {
    pub fn new(credentials: Arc<Credentials>) -> Self {
        Self { credentials }
    }

    /// `"Bearer " + access token`, read at call time.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.credentials.access_token())
    }

    /// `"Basic " + base64(app_id ":" app_secret)`, used by the token endpoint.
    pub fn basic_header(&self) -> String {
        let pair = format!(
            "{}:{}",
            self.credentials.app_id(),
            self.credentials.app_secret()
        );
        format!("Basic {}", STANDARD.encode(pair))
    }
}
