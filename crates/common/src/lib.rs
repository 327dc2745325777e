//! Common types shared by the SWS client crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
