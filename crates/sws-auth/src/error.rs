//! Error types for credential persistence

/// Errors from session persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("session parse error: {0}")]
    SessionParse(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
