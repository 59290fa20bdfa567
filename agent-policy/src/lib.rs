//! Admission control for agent requests.
//!
//! [`rate_limit`] counts requests per key, [`auth`] checks credentials,
//! [`guard`] validates and sanitizes input, and [`gate`] runs all three in
//! order for each request.

#![warn(missing_docs, clippy::pedantic)]

pub mod auth;
pub mod gate;
pub mod guard;
pub mod rate_limit;

use thiserror::Error;

pub use auth::{AuthError, AuthResult, Authenticator, CredentialVerifier, Principal};
pub use gate::{Admission, AdmissionGate, Rejection};
pub use guard::{InputGuard, ThreatCategory, ValidationReport, sanitize};
pub use rate_limit::{
    Clock, KeyExtractor, ManualClock, RateDecision, RateLimiter, SystemClock, default_key,
};

/// Errors raised while building admission policies.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Settings could not be turned into a working policy.
    #[error("invalid policy settings: {0}")]
    InvalidSettings(&'static str),
}

/// Result alias for policy construction.
pub type PolicyResult<T> = Result<T, PolicyError>;
