//! Agent execution and tool resolution pipeline.
//!
//! This facade bundles the workspace crates behind feature flags. Most users
//! only need [`kernel::ExecutionOrchestrator`]: register agents and tools on
//! it, then call `execute(agent, context)`.

#![warn(missing_docs, clippy::pedantic)]

/// Shared request, response and identity types.
pub use agent_primitives as primitives;

/// Execution orchestrator, middleware, fallback and events (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use agent_kernel as kernel;

/// Model adapter trait and chat request types (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use agent_adapters as adapters;

/// Registry, tool metadata and parameter resolution (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use agent_tools as tools;

/// Rate limiting, input guard and authentication (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use agent_policy as policy;

/// Tracing subscriber setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;

/// System prompt templates (enabled by `prompts` feature).
#[cfg(feature = "prompts")]
pub use agent_prompts as prompts;

/// Runtime configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use agent_config as config;
