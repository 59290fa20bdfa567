//! Strongly typed configuration schema.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{ConfigError, ConfigResult};

/// Iteration cap applied to the model-driven tool loop when none is configured.
pub const DEFAULT_MAX_ITERATIONS: usize = 3;

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Rate limiting; disabled when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitSettings>,
    /// Input guard and authentication; disabled when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<GuardSettings>,
    /// Execution loop settings.
    pub execution: ExecutionSettings,
}

impl RuntimeConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds and validates configuration from an already-decoded JSON value.
    ///
    /// # Errors
    ///
    /// Same as [`RuntimeConfig::from_json_str`].
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every configured section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.validate()?;
        }
        if let Some(guard) = &self.guard {
            guard.validate()?;
        }
        self.execution.validate()?;

        debug!(
            rate_limit = self.rate_limit.is_some(),
            guard = self.guard.is_some(),
            max_iterations = self.execution.max_iterations,
            "runtime configuration validated"
        );
        Ok(())
    }
}

/// Fixed-window rate limit parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSettings {
    /// Admissions allowed per key per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_seconds: u64,
    /// How often elapsed windows are swept; defaults to the window length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_interval_seconds: Option<u64>,
}

impl RateLimitSettings {
    /// Creates settings with the given budget.
    #[must_use]
    pub const fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
            sweep_interval_seconds: None,
        }
    }

    /// Returns the window as a [`Duration`].
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// Returns the sweep interval, falling back to the window length.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.unwrap_or(self.window_seconds))
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_requests == 0 {
            return Err(ConfigError::invalid(
                "rate_limit.max_requests",
                "must be greater than zero",
            ));
        }
        if self.window_seconds == 0 {
            return Err(ConfigError::invalid(
                "rate_limit.window_seconds",
                "must be greater than zero",
            ));
        }
        if self.sweep_interval_seconds == Some(0) {
            return Err(ConfigError::invalid(
                "rate_limit.sweep_interval_seconds",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Input validation and authentication settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardSettings {
    /// Maximum accepted input length in characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_input_length: Option<usize>,
    /// Strip control characters and collapse whitespace before other checks.
    pub sanitize_input: bool,
    /// Hosts (and their sub-domains) that URLs in the input may point at.
    /// Empty means no allowlist.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_domains: Vec<String>,
    /// Authentication; disabled when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthSettings>,
}

impl GuardSettings {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_input_length == Some(0) {
            return Err(ConfigError::invalid(
                "guard.max_input_length",
                "must be greater than zero",
            ));
        }
        if self.allowed_domains.iter().any(|d| d.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "guard.allowed_domains",
                "entries cannot be empty",
            ));
        }
        if let Some(auth) = &self.authentication {
            auth.validate()?;
        }
        Ok(())
    }
}

/// Supported authentication schemes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// Every request is treated as authenticated.
    #[default]
    None,
    /// `Authorization: Bearer <token>` checked against configured tokens.
    Token,
    /// Shared secret key checked against configured keys.
    ApiKey,
    /// Bearer token verified by an external verifier.
    ThirdParty,
}

impl AuthScheme {
    /// Header a scheme reads its credential from unless overridden.
    #[must_use]
    pub const fn default_header(self) -> &'static str {
        match self {
            Self::ApiKey => "x-api-key",
            Self::None | Self::Token | Self::ThirdParty => "authorization",
        }
    }
}

/// A credential accepted by the token or key schemes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialEntry {
    /// Token or key value.
    pub secret: String,
    /// User identity the credential maps to.
    pub user: String,
}

/// Authentication settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSettings {
    /// Scheme in effect.
    pub scheme: AuthScheme,
    /// Header override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Accepted credentials for the token and key schemes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<CredentialEntry>,
}

impl AuthSettings {
    /// Returns the header name this configuration reads.
    #[must_use]
    pub fn header_name(&self) -> &str {
        self.header
            .as_deref()
            .unwrap_or(self.scheme.default_header())
    }

    fn validate(&self) -> ConfigResult<()> {
        if matches!(self.scheme, AuthScheme::Token | AuthScheme::ApiKey)
            && self.credentials.is_empty()
        {
            return Err(ConfigError::invalid(
                "guard.authentication.credentials",
                "token and api_key schemes need at least one credential",
            ));
        }
        if self.header.as_deref().is_some_and(|h| h.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "guard.authentication.header",
                "cannot be empty",
            ));
        }
        Ok(())
    }
}

/// Execution loop settings.
///
/// The timeouts are accepted and exposed for the surrounding system but are not
/// enforced by the pipeline itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionSettings {
    /// Cap on model-driven tool loop iterations.
    pub max_iterations: usize,
    /// Whole-request timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    /// Per-tool timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_timeout_ms: Option<u64>,
    /// Per-agent timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_timeout_ms: Option<u64>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            request_timeout_ms: None,
            tool_timeout_ms: None,
            agent_timeout_ms: None,
        }
    }
}

impl ExecutionSettings {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid(
                "execution.max_iterations",
                "must be greater than zero",
            ));
        }
        let timeouts = [
            ("execution.request_timeout_ms", self.request_timeout_ms),
            ("execution.tool_timeout_ms", self.tool_timeout_ms),
            ("execution.agent_timeout_ms", self.agent_timeout_ms),
        ];
        for (field, value) in timeouts {
            if value == Some(0) {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }
        Ok(())
    }
}
