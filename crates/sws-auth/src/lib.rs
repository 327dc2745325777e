//! Credential building blocks for the SWS client
//!
//! Holds the live credential state shared by every service client, builds
//! the `Basic` and `Bearer` authorization header values, models the identity
//! service's token refresh response, and provides the PKCE challenge
//! provider used by the authorization-code flow. This crate has no knowledge
//! of the request pipeline; `sws-client` wires these pieces together.
//!
//! Credential flow:
//! 1. App id/secret come from configuration (`Credentials::new`)
//! 2. A session is restored from `SessionStore::load()` or set explicitly
//! 3. Every request reads `AuthHeaders::bearer_header()` at build time
//! 4. After a refresh, `Credentials::commit_refresh()` swaps both tokens
//! 5. The `TokenUpdatedHandler` (e.g. `SessionStore::updated_handler()`)
//!    receives the new tokens once per successful refresh

pub mod constants;
pub mod credentials;
pub mod error;
pub mod headers;
pub mod pkce;
pub mod token;

pub use constants::*;
pub use credentials::{Credentials, Session, SessionStore};
pub use error::{Error, Result};
pub use headers::AuthHeaders;
pub use pkce::{ChallengeProvider, S256ChallengeProvider, compute_challenge, generate_verifier};
pub use token::{
    ExpiresAt, TokenGrant, TokenRefreshResponse, TokenUpdate, TokenUpdatedHandler,
    token_updated_handler,
};
