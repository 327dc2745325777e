//! Outbound request descriptor
//!
//! A `RequestDescriptor` is built once per call and never mutated; a replay
//! derives a new descriptor with a different Authorization header. Building
//! applies two wire rules:
//!
//! - Body filter: a key is sent only if its value is truthy or is a literal
//!   boolean. `false` survives; `""`, `null` and `0` are dropped.
//! - GET requests carry the filtered body as a query string
//!   (`key=encodeURIComponent(value)` joined with `&`, appended after `?` or
//!   `&`); every other method sends it as a JSON payload. Never both.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

pub const ACCEPT: &str = "Accept";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const AUTHORIZATION: &str = "Authorization";
const JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One outbound call: method, final URL, headers and JSON payload.
#[derive(Clone, PartialEq)]
pub struct RequestDescriptor {
    method: Method,
    url: String,
    headers: BTreeMap<String, String>,
    body: Option<Value>,
    token_retry: bool,
}

impl RequestDescriptor {
    /// Build a request, applying the body filter and GET query encoding.
    ///
    /// `authorization` is the full header value (`"Bearer ..."`,
    /// `"Basic ..."`); no Authorization header is sent when it is `None`.
    pub fn new(
        method: Method,
        url: impl Into<String>,
        body: Option<Map<String, Value>>,
        authorization: Option<String>,
    ) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(ACCEPT.to_string(), JSON.to_string());
        headers.insert(CONTENT_TYPE.to_string(), JSON.to_string());
        if let Some(value) = authorization {
            headers.insert(AUTHORIZATION.to_string(), value);
        }

        let mut url = url.into();
        let body = body.map(filter_body);
        let body = match method {
            Method::Get => {
                if let Some(fields) = &body {
                    url = append_query(&url, fields);
                }
                None
            }
            _ => body.map(Value::Object),
        };

        Self {
            method,
            url,
            headers,
            body,
            token_retry: true,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn authorization(&self) -> Option<&str> {
        self.header(AUTHORIZATION)
    }

    /// The token this request was sent with, if it used a bearer credential.
    /// An empty string means it was sent before any access token existed.
    pub fn bearer_token(&self) -> Option<&str> {
        self.authorization()?.strip_prefix("Bearer ")
    }

    /// Whether an invalid-token failure on this request may trigger a
    /// refresh-and-replay cycle.
    pub fn allows_token_retry(&self) -> bool {
        self.token_retry
    }

    /// Copy of this request carrying a different Authorization value.
    pub fn with_authorization(&self, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.headers.insert(AUTHORIZATION.to_string(), value.into());
        next
    }

    /// Mark the request as ineligible for automatic token retry. Used for
    /// replays and for the refresh call itself.
    pub fn without_token_retry(mut self) -> Self {
        self.token_retry = false;
        self
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: BTreeMap<&str, &str> = self
            .headers
            .iter()
            .map(|(k, v)| {
                if k == AUTHORIZATION {
                    (k.as_str(), "[REDACTED]")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &headers)
            .field("has_body", &self.body.is_some())
            .field("token_retry", &self.token_retry)
            .finish()
    }
}

/// Keep the fields that are truthy or literal booleans.
pub fn filter_body(body: Map<String, Value>) -> Map<String, Value> {
    body.into_iter().filter(|(_, value)| keep_field(value)).collect()
}

fn keep_field(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(_) => true,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Append `fields` to `url` as a query string.
pub fn append_query(url: &str, fields: &Map<String, Value>) -> String {
    if fields.is_empty() {
        return url.to_string();
    }
    let query = fields
        .iter()
        .map(|(key, value)| format!("{key}={}", encode_uri_component(&query_value(value))))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

/// String form of a query value: strings verbatim, scalars as JSON text,
/// arrays comma-joined, objects as JSON.
fn query_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(query_value).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Percent-encode like `encodeURIComponent`: RFC 3986 unreserved characters
/// plus `!*'()` pass through.
pub fn encode_uri_component(value: &str) -> String {
    urlencoding::encode(value)
        .replace("%21", "!")
        .replace("%2A", "*")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
}
