//! Observability setup.
//!
//! Installs a `tracing-subscriber` formatter filtered by `RUST_LOG`, falling back
//! to the configured directive when the variable is unset or invalid.

#![warn(missing_docs, clippy::pedantic)]

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Output layout for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-field single-line output.
    #[default]
    Full,
    /// Abbreviated single-line output.
    Compact,
    /// Multi-line, human-oriented output.
    Pretty,
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Directive used when `RUST_LOG` is absent, e.g. `info` or `agent_kernel=debug`.
    pub default_directive: String,
    /// Line layout.
    pub format: LogFormat,
    /// Include the event target (module path) in each line.
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_owned(),
            format: LogFormat::Full,
            with_target: false,
        }
    }
}

impl TelemetryConfig {
    /// Builds the filter for this configuration.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directive.as_str()))
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber has already been set.
    #[error("tracing subscriber already installed: {reason}")]
    AlreadyInstalled {
        /// Message reported by `tracing-subscriber`.
        reason: String,
    },
}

/// Installs the global tracing subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::AlreadyInstalled`] when another subscriber was set
/// first, which commonly happens when tests initialise logging repeatedly.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_target(config.with_target);

    let result = match config.format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    result.map_err(|err| TelemetryError::AlreadyInstalled {
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_reports_error() {
        let config = TelemetryConfig {
            format: LogFormat::Compact,
            ..TelemetryConfig::default()
        };
        let _ = init_tracing(&config);

        let err = init_tracing(&config).expect_err("second install should fail");
        assert!(matches!(err, TelemetryError::AlreadyInstalled { .. }));
    }
}
