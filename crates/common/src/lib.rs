//! Shared types for the airbox workspace
//!
//! Configuration errors and the `Secret` wrapper used for client secrets
//! and anything else that must stay out of logs.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
