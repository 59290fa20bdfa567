//! Core shared types for the toolgate execution pipeline.
//!
//! Everything that crosses a crate boundary lives here: the opaque handle that
//! links tools back to the agent instance that owns them, agent metadata, and
//! the request/response values passed through the pipeline.

#![warn(missing_docs, clippy::pedantic)]

mod agent;
mod context;
mod envelope;
mod error;
mod ids;

/// Agent metadata and the registry record that pairs it with an instance.
pub use agent::{AgentMetadata, AgentMetadataBuilder, AgentRecord};
/// Per-request input, history, and free-form metadata.
pub use context::{ConversationTurn, RequestContext, TurnRole};
/// Response produced by the orchestrator and enriched by middleware.
pub use envelope::ResponseEnvelope;
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Opaque identity token for an agent implementation.
pub use ids::InstanceHandle;
