//! Agent execution pipeline.
//!
//! [`ExecutionOrchestrator`] admits a request through the policy gate, wraps
//! the agent's work in its [`middleware`] hooks, hands the agent's tools to a
//! [`ModelOrchestrator`], and falls back to heuristic tool dispatch when the
//! model does not produce an answer. Registration and execution outcomes are
//! published on an [`EventBus`].

#![warn(missing_docs, clippy::pedantic)]

pub mod events;
pub mod fallback;
pub mod middleware;
pub mod orchestration;
pub mod orchestrator;
pub mod phase;
pub mod tool_adapter;

pub use events::{CollectingObserver, EventBus, EventObserver, LifecycleEvent, TracingEventObserver};
pub use fallback::{FALLBACK_APOLOGY, FallbackDispatcher, FallbackOutcome, is_relevant};
pub use middleware::{AgentMiddleware, MiddlewareError, MiddlewarePipeline, MiddlewareResult};
pub use orchestration::{
    AdapterOrchestrator, ModelOrchestrator, OrchestrationError, OrchestrationOutcome,
    OrchestrationRequest, OrchestrationResult, STOPPED_SENTINEL,
};
pub use orchestrator::{DEGRADED_APOLOGY, ExecuteError, ExecutionOrchestrator};
pub use phase::{PhaseError, PhaseEvent, PhaseResult, RequestLifecycle, RequestPhase};
pub use tool_adapter::{ToolAdapter, ToolCallError};
