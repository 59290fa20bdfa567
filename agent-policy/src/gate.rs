//! Admission gate combining the rate limiter, authenticator and input guard.

use std::sync::Arc;

use agent_config::RuntimeConfig;
use agent_primitives::RequestContext;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::{AuthError, Authenticator, Principal};
use crate::guard::InputGuard;
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::PolicyResult;

/// Why a request was turned away. Each variant is terminal for the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The request's key has exhausted its budget for the current window.
    #[error("rate limit exceeded for `{key}`; window resets at {reset_at}")]
    RateLimited {
        /// Rate-limit bucket.
        key: String,
        /// When the bucket's window ends.
        reset_at: DateTime<Utc>,
    },
    /// Authentication rejected the request.
    #[error("authentication failed: {source}")]
    Unauthenticated {
        /// Underlying authentication error.
        #[from]
        source: AuthError,
    },
    /// The input guard rejected the request.
    #[error("input validation failed: {}", .errors.join("; "))]
    InvalidInput {
        /// Every problem the guard found.
        errors: Vec<String>,
    },
}

/// What a request carries forward once admitted.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Rate-limit key and decision, when limiting is enabled.
    pub rate: Option<(String, RateDecision)>,
    /// Authenticated identity.
    pub principal: Principal,
    /// Input text to process: sanitized when sanitization is enabled.
    pub input: String,
}

/// Runs every admission check, in order: rate limit, authentication, input
/// validation. The first failing stage ends the request.
#[derive(Debug, Clone, Default)]
pub struct AdmissionGate {
    limiter: Option<Arc<RateLimiter>>,
    authenticator: Authenticator,
    guard: Option<InputGuard>,
}

impl AdmissionGate {
    /// Creates a gate that admits everything.
    #[must_use]
    pub fn open() -> Self {
        Self::default()
    }

    /// Builds a gate from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PolicyError::InvalidSettings`] when the rate limit settings
    /// cannot be represented.
    pub fn from_config(config: &RuntimeConfig) -> PolicyResult<Self> {
        let limiter = config
            .rate_limit
            .as_ref()
            .map(RateLimiter::from_settings)
            .transpose()?
            .map(Arc::new);
        let (guard, authenticator) = match &config.guard {
            Some(settings) => (
                Some(InputGuard::from_settings(settings)),
                settings
                    .authentication
                    .as_ref()
                    .map(Authenticator::from_settings)
                    .unwrap_or_default(),
            ),
            None => (None, Authenticator::disabled()),
        };

        Ok(Self {
            limiter,
            authenticator,
            guard,
        })
    }

    /// Installs a rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Installs an authenticator.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Authenticator) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Installs an input guard.
    #[must_use]
    pub fn with_guard(mut self, guard: InputGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Returns the installed rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    /// Admits or rejects `ctx`.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] from the first stage that refuses `ctx`.
    pub async fn admit(&self, ctx: &RequestContext) -> Result<Admission, Rejection> {
        let rate = match &self.limiter {
            Some(limiter) => {
                let (key, decision) = limiter.check_context(ctx);
                if !decision.allowed {
                    warn!(key = %key, reset_at = %decision.reset_at, "request rate limited");
                    return Err(Rejection::RateLimited {
                        key,
                        reset_at: decision.reset_at,
                    });
                }
                Some((key, decision))
            }
            None => None,
        };

        let principal = self.authenticator.authenticate(ctx).await.map_err(|err| {
            warn!(error = %err, "request failed authentication");
            Rejection::from(err)
        })?;

        let input = match &self.guard {
            Some(guard) => {
                let report = guard.validate(ctx.input());
                if !report.is_valid() {
                    warn!(errors = ?report.errors(), "request failed validation");
                    return Err(Rejection::InvalidInput {
                        errors: report.into_errors(),
                    });
                }
                report
                    .sanitized_input()
                    .map_or_else(|| ctx.input().to_owned(), ToOwned::to_owned)
            }
            None => ctx.input().to_owned(),
        };

        debug!(user = ?principal.user, "request admitted");
        Ok(Admission {
            rate,
            principal,
            input,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> RuntimeConfig {
        RuntimeConfig::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn open_gate_passes_input_through() {
        let admission = AdmissionGate::open()
            .admit(&RequestContext::new("  raw  "))
            .await
            .unwrap();
        assert_eq!(admission.input, "  raw  ");
        assert!(admission.rate.is_none());
    }

    #[tokio::test]
    async fn rate_limit_runs_before_validation() {
        let gate = AdmissionGate::from_config(&config(json!({
            "rate_limit": { "max_requests": 1, "window_seconds": 60 },
            "guard": { "max_input_length": 5 }
        })))
        .unwrap();

        let long = RequestContext::new("far too long").with_metadata("ip", json!("1.2.3.4"));
        let err = gate.admit(&long).await.unwrap_err();
        assert!(matches!(err, Rejection::InvalidInput { .. }));

        // The rejected request still consumed the key's budget.
        let err = gate.admit(&long).await.unwrap_err();
        assert!(matches!(err, Rejection::RateLimited { ref key, .. } if key == "1.2.3.4"));
    }

    #[tokio::test]
    async fn authentication_runs_before_validation() {
        let gate = AdmissionGate::from_config(&config(json!({
            "guard": {
                "max_input_length": 5,
                "authentication": {
                    "scheme": "api_key",
                    "credentials": [{ "secret": "k", "user": "alice" }]
                }
            }
        })))
        .unwrap();

        let err = gate
            .admit(&RequestContext::new("far too long"))
            .await
            .unwrap_err();
        assert!(matches!(err, Rejection::Unauthenticated { .. }));
    }

    #[tokio::test]
    async fn sanitized_input_is_forwarded() {
        let gate = AdmissionGate::from_config(&config(json!({
            "guard": { "sanitize_input": true }
        })))
        .unwrap();

        let admission = gate
            .admit(&RequestContext::new(" add   2\tand 3 "))
            .await
            .unwrap();
        assert_eq!(admission.input, "add 2 and 3");
    }
}
