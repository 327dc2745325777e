//! Error types for the request pipeline
//!
//! `ServiceError` is the per-request failure value: it keeps the request
//! that failed (so it can be replayed) and the raw response. `Error` covers
//! client construction and configuration.

use crate::request::RequestDescriptor;

/// Errors from building or configuring a client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] common::Error),

    #[error("session error: {0}")]
    Session(#[from] sws_auth::Error),

    #[error("HTTP client error: {0}")]
    Http(String),
}

/// Result alias for client construction.
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong with one request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    /// Non-2xx response, with the service error code when the body has one
    #[error("HTTP {status}{}", code_suffix(.code))]
    Status { status: u16, code: Option<i64> },

    #[error("request timed out")]
    Timeout,

    #[error("service unreachable: {0}")]
    Unreachable(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// 2xx response whose body is not JSON
    #[error("invalid response body: {0}")]
    Decode(String),
}

fn code_suffix(code: &Option<i64>) -> String {
    code.map(|c| format!(" (code {c})")).unwrap_or_default()
}

/// Raw response retained on a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// A classified failure of one outbound request.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{} {} failed: {failure}", .request.method(), .request.url())]
pub struct ServiceError {
    failure: Failure,
    request: RequestDescriptor,
    response: Option<RawResponse>,
}

impl ServiceError {
    pub fn new(failure: Failure, request: RequestDescriptor, response: Option<RawResponse>) -> Self {
        Self {
            failure,
            request,
            response,
        }
    }

    /// Build the error for a non-2xx response, reading the service code from
    /// the body.
    pub fn from_status(request: RequestDescriptor, status: u16, body: String) -> Self {
        let code = error_code(&body);
        Self {
            failure: Failure::Status { status, code },
            request,
            response: Some(RawResponse { status, body }),
        }
    }

    pub fn failure(&self) -> &Failure {
        &self.failure
    }

    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }

    pub fn response(&self) -> Option<&RawResponse> {
        self.response.as_ref()
    }

    /// HTTP status, absent for transport-level failures.
    pub fn http_status(&self) -> Option<u16> {
        match self.failure {
            Failure::Status { status, .. } => Some(status),
            _ => None,
        }
    }

    /// Service-specific error code, present only when the body carries one.
    pub fn code(&self) -> Option<i64> {
        match self.failure {
            Failure::Status { code, .. } => code,
            _ => None,
        }
    }

    /// Response body parsed as JSON, if there is one.
    pub fn body_json(&self) -> Option<serde_json::Value> {
        self.response
            .as_ref()
            .and_then(|r| serde_json::from_str(&r.body).ok())
    }
}

/// Extract the service error code from a response body.
///
/// Looks at the top-level `code` first, then `error.code`.
pub fn error_code(body: &str) -> Option<i64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("code")
        .and_then(|c| c.as_i64())
        .or_else(|| value.pointer("/error/code").and_then(|c| c.as_i64()))
}
