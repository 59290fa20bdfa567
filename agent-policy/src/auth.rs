//! Lightweight request authentication.
//!
//! Credentials are read from the request metadata: first from
//! `metadata["headers"][<header>]` (header names match case-insensitively),
//! then from a top-level metadata entry with the same name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use agent_config::{AuthScheme, AuthSettings};
use agent_primitives::RequestContext;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors produced while authenticating a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The expected credential was not present.
    #[error("missing credential in `{header}`")]
    MissingCredential {
        /// Header the credential was expected in.
        header: String,
    },
    /// The credential was present but not in the expected form.
    #[error("malformed credential: {reason}")]
    MalformedCredential {
        /// What was wrong with it.
        reason: &'static str,
    },
    /// The credential did not match any accepted value.
    #[error("invalid credential")]
    InvalidCredential,
    /// Third-party authentication is configured without a verifier.
    #[error("no credential verifier installed for third-party authentication")]
    VerifierUnavailable,
    /// The external verifier failed.
    #[error("credential verification failed: {reason}")]
    Verification {
        /// Verifier-supplied explanation.
        reason: String,
    },
}

/// Result alias for authentication.
pub type AuthResult<T> = Result<T, AuthError>;

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// User the credential maps to; `None` when authentication is disabled.
    pub user: Option<String>,
    /// Scheme that admitted the request.
    pub scheme: AuthScheme,
}

impl Principal {
    fn anonymous() -> Self {
        Self {
            user: None,
            scheme: AuthScheme::None,
        }
    }
}

/// Verifies bearer tokens issued by an external identity provider.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Returns the user the token belongs to.
    async fn verify(&self, token: &str) -> AuthResult<String>;
}

/// Authenticates requests according to [`AuthSettings`].
#[derive(Clone)]
pub struct Authenticator {
    scheme: AuthScheme,
    header: String,
    credentials: HashMap<String, String>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("scheme", &self.scheme)
            .field("header", &self.header)
            .field("credentials", &self.credentials.len())
            .field("verifier", &self.verifier.is_some())
            .finish()
    }
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Authenticator {
    /// Treats every request as authenticated.
    #[must_use]
    pub fn disabled() -> Self {
        Self::from_settings(&AuthSettings::default())
    }

    /// Creates an authenticator from configuration.
    #[must_use]
    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self {
            scheme: settings.scheme,
            header: settings.header_name().to_ascii_lowercase(),
            credentials: settings
                .credentials
                .iter()
                .map(|entry| (entry.secret.clone(), entry.user.clone()))
                .collect(),
            verifier: None,
        }
    }

    /// Installs the verifier used by the third-party scheme.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Returns the active scheme.
    #[must_use]
    pub const fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    /// Authenticates `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] describing why the credential was rejected.
    pub async fn authenticate(&self, ctx: &RequestContext) -> AuthResult<Principal> {
        let user = match self.scheme {
            AuthScheme::None => return Ok(Principal::anonymous()),
            AuthScheme::Token => {
                let token = bearer_token(self.credential(ctx)?)?;
                self.lookup(token)?
            }
            AuthScheme::ApiKey => self.lookup(self.credential(ctx)?.trim())?,
            AuthScheme::ThirdParty => {
                let token = bearer_token(self.credential(ctx)?)?;
                let verifier = self.verifier.as_ref().ok_or(AuthError::VerifierUnavailable)?;
                verifier.verify(token).await?
            }
        };

        debug!(scheme = ?self.scheme, user = %user, "request authenticated");
        Ok(Principal {
            user: Some(user),
            scheme: self.scheme,
        })
    }

    fn credential<'a>(&self, ctx: &'a RequestContext) -> AuthResult<&'a str> {
        find_credential(ctx, &self.header).ok_or_else(|| AuthError::MissingCredential {
            header: self.header.clone(),
        })
    }

    fn lookup(&self, secret: &str) -> AuthResult<String> {
        self.credentials
            .get(secret)
            .cloned()
            .ok_or(AuthError::InvalidCredential)
    }
}

fn find_credential<'a>(ctx: &'a RequestContext, header: &str) -> Option<&'a str> {
    let metadata = ctx.metadata();
    let from_headers = metadata
        .get("headers")
        .and_then(Value::as_object)
        .and_then(|headers| {
            headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(header))
                .and_then(|(_, value)| value.as_str())
        });
    from_headers.or_else(|| {
        metadata
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(header))
            .and_then(|(_, value)| value.as_str())
    })
}

fn bearer_token(raw: &str) -> AuthResult<&str> {
    let raw = raw.trim();
    let token = match raw.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => {
            return Err(AuthError::MalformedCredential {
                reason: "expected `Bearer <token>`",
            });
        }
    };
    if token.is_empty() {
        return Err(AuthError::MalformedCredential {
            reason: "bearer token is empty",
        });
    }
    Ok(token)
}
