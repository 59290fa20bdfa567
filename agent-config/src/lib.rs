//! Configuration for the execution pipeline.
//!
//! Every section is optional. An absent section means the feature it controls is
//! disabled: no rate limiting, no input guard, no authentication.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use schema::{
    AuthScheme, AuthSettings, CredentialEntry, ExecutionSettings, GuardSettings,
    RateLimitSettings, RuntimeConfig, DEFAULT_MAX_ITERATIONS,
};
