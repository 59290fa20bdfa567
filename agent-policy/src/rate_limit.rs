//! Fixed-window request counting per key.
//!
//! Bursts of up to twice the budget are possible across a window boundary.
//! That is the accepted cost of constant memory and constant-time checks.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use agent_config::RateLimitSettings;
use agent_primitives::RequestContext;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::{PolicyError, PolicyResult};

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().expect("manual clock poisoned");
        *now += by;
    }

    /// Jumps the clock to `instant`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().expect("manual clock poisoned") = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("manual clock poisoned")
    }
}

/// Derives the rate-limit bucket for a request.
pub type KeyExtractor = Arc<dyn Fn(&RequestContext) -> String + Send + Sync>;

/// Bucket used when a request carries no identifying data.
pub const ANONYMOUS_KEY: &str = "anonymous";

/// Default key: metadata `ip`, then metadata `user_id`, then the session id,
/// then [`ANONYMOUS_KEY`].
#[must_use]
pub fn default_key(ctx: &RequestContext) -> String {
    ctx.metadata_str("ip")
        .or_else(|| ctx.metadata_str("user_id"))
        .or_else(|| ctx.session_id())
        .unwrap_or(ANONYMOUS_KEY)
        .to_owned()
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Admissions left in the current window.
    pub remaining: u32,
    /// When the current window ends.
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Per-key fixed-window rate limiter.
///
/// Check-and-increment happens under a single lock, so concurrent requests on
/// the same key can never both observe spare budget and overshoot it.
pub struct RateLimiter {
    max_requests: u32,
    window: TimeDelta,
    windows: Mutex<HashMap<String, Window>>,
    clock: Arc<dyn Clock>,
    key_extractor: KeyExtractor,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Creates a limiter admitting `max_requests` per key per `window`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidSettings`] for a zero budget or a window
    /// that is zero or too large to represent.
    pub fn new(max_requests: u32, window: Duration) -> PolicyResult<Self> {
        if max_requests == 0 {
            return Err(PolicyError::InvalidSettings(
                "rate limit budget must be greater than zero",
            ));
        }
        let window = TimeDelta::from_std(window)
            .map_err(|_| PolicyError::InvalidSettings("rate limit window out of range"))?;
        if window <= TimeDelta::zero() {
            return Err(PolicyError::InvalidSettings(
                "rate limit window must be greater than zero",
            ));
        }

        Ok(Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
            clock: Arc::new(SystemClock),
            key_extractor: Arc::new(default_key),
        })
    }

    /// Creates a limiter from configuration.
    ///
    /// # Errors
    ///
    /// Same as [`RateLimiter::new`].
    pub fn from_settings(settings: &RateLimitSettings) -> PolicyResult<Self> {
        Self::new(settings.max_requests, settings.window())
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the key derivation function.
    #[must_use]
    pub fn with_key_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&RequestContext) -> String + Send + Sync + 'static,
    {
        self.key_extractor = Arc::new(extractor);
        self
    }

    /// Returns the per-window budget.
    #[must_use]
    pub const fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Derives the bucket key for `ctx`.
    #[must_use]
    pub fn key_for(&self, ctx: &RequestContext) -> String {
        (self.key_extractor)(ctx)
    }

    /// Counts one request against `key`.
    ///
    /// # Panics
    ///
    /// Panics if the window table lock is poisoned.
    pub fn check(&self, key: &str) -> RateDecision {
        let now = self.clock.now();
        let mut windows = self.windows.lock().expect("rate limit table poisoned");

        let decision = match windows.get_mut(key) {
            Some(window) if now < window.reset_at => {
                if window.count < self.max_requests {
                    window.count += 1;
                    RateDecision {
                        allowed: true,
                        remaining: self.max_requests - window.count,
                        reset_at: window.reset_at,
                    }
                } else {
                    RateDecision {
                        allowed: false,
                        remaining: 0,
                        reset_at: window.reset_at,
                    }
                }
            }
            _ => {
                let reset_at = now
                    .checked_add_signed(self.window)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                windows.insert(key.to_owned(), Window { count: 1, reset_at });
                RateDecision {
                    allowed: true,
                    remaining: self.max_requests - 1,
                    reset_at,
                }
            }
        };

        trace!(key, allowed = decision.allowed, remaining = decision.remaining, "rate limit check");
        decision
    }

    /// Derives the key for `ctx` and counts one request against it.
    ///
    /// # Panics
    ///
    /// Panics if the window table lock is poisoned.
    pub fn check_context(&self, ctx: &RequestContext) -> (String, RateDecision) {
        let key = self.key_for(ctx);
        let decision = self.check(&key);
        (key, decision)
    }

    /// Drops every window that has already elapsed, returning how many were
    /// removed.
    ///
    /// # Panics
    ///
    /// Panics if the window table lock is poisoned.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut windows = self.windows.lock().expect("rate limit table poisoned");
        let before = windows.len();
        windows.retain(|_, window| now < window.reset_at);
        let removed = before - windows.len();
        if removed > 0 {
            debug!(removed, remaining = windows.len(), "swept elapsed rate limit windows");
        }
        removed
    }

    /// Returns how many keys currently hold a window.
    ///
    /// # Panics
    ///
    /// Panics if the window table lock is poisoned.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .expect("rate limit table poisoned")
            .len()
    }

    /// Runs [`RateLimiter::sweep`] every `interval` on the current tokio
    /// runtime. The task ends once the last strong reference to the limiter
    /// is dropped.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    debug!("rate limiter dropped; sweeper exiting");
                    break;
                };
                limiter.sweep();
            }
        })
    }
}
