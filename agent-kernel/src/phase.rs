//! Per-request phase tracking for the execution pipeline.

use std::fmt;

use thiserror::Error;
use tracing::debug;

/// Phases a single request moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    /// Request accepted by the orchestrator, nothing checked yet.
    Received,
    /// Passed the rate limiter and authentication.
    Admitted,
    /// Input passed the guard.
    Validated,
    /// Agent and tool adapters were resolved.
    Resolved,
    /// Model orchestration ran.
    Invoked,
    /// Orchestration produced nothing usable; the fallback dispatcher is running.
    Fallback,
    /// A response was produced.
    Succeeded,
    /// The request ended in a rejection or a degraded response.
    Failed,
}

impl RequestPhase {
    /// Returns `true` once no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::Admitted => "admitted",
            Self::Validated => "validated",
            Self::Resolved => "resolved",
            Self::Invoked => "invoked",
            Self::Fallback => "fallback",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        })
    }
}

/// Events that move a request between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Rate limit and authentication passed.
    Admit,
    /// Input validation passed.
    Validate,
    /// Tools were gathered for the agent.
    Resolve,
    /// The model orchestration returned.
    Invoke,
    /// A usable answer is available.
    Answer,
    /// Switch to heuristic tool dispatch.
    FallBack,
    /// Abort the request.
    Fail,
}

/// Phase tracker for one request.
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    agent: String,
    phase: RequestPhase,
    fell_back: bool,
}

impl RequestLifecycle {
    /// Starts tracking a request addressed to `agent`.
    #[must_use]
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            phase: RequestPhase::Received,
            fell_back: false,
        }
    }

    /// Returns the agent the request is addressed to.
    #[must_use]
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Returns `true` once the request has passed through [`RequestPhase::Fallback`].
    #[must_use]
    pub const fn used_fallback(&self) -> bool {
        self.fell_back
    }

    /// Applies an event, returning the resulting phase.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::InvalidTransition`] when the event is not allowed
    /// from the current phase.
    pub fn transition(&mut self, event: PhaseEvent) -> PhaseResult<RequestPhase> {
        use PhaseEvent as E;
        use RequestPhase as P;

        let next = match (self.phase, event) {
            (P::Received, E::Admit) => Some(P::Admitted),
            (P::Admitted, E::Validate) => Some(P::Validated),
            (P::Validated, E::Resolve) => Some(P::Resolved),
            (P::Resolved, E::Invoke) => Some(P::Invoked),
            (P::Invoked, E::FallBack) => Some(P::Fallback),
            (P::Invoked | P::Fallback, E::Answer) => Some(P::Succeeded),
            (from, E::Fail) if !from.is_terminal() => Some(P::Failed),
            _ => None,
        };

        let Some(next) = next else {
            return Err(PhaseError::InvalidTransition {
                agent: self.agent.clone(),
                from: self.phase,
                event,
            });
        };

        debug!(agent = %self.agent, from = %self.phase, to = %next, ?event, "request phase transition");
        self.fell_back |= next == P::Fallback;
        self.phase = next;
        Ok(next)
    }
}

/// Errors raised by [`RequestLifecycle`].
#[derive(Debug, Error)]
pub enum PhaseError {
    /// Transition was not permitted from the current phase.
    #[error("invalid request transition from {from} via {event:?} for agent {agent}")]
    InvalidTransition {
        /// Agent the request was addressed to.
        agent: String,
        /// Phase prior to the attempted transition.
        from: RequestPhase,
        /// Event that was rejected.
        event: PhaseEvent,
    },
}

/// Result alias for phase transitions.
pub type PhaseResult<T> = Result<T, PhaseError>;
