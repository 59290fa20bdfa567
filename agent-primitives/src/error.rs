//! Shared error definitions for agent primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided instance handle could not be parsed.
    #[error("invalid instance handle: {source}")]
    InvalidHandle {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Agent metadata failed validation.
    #[error("invalid agent metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },
}
