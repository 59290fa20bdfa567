//! Model adapters used by agents.
//!
//! Provider clients live outside this workspace; they plug in by implementing
//! [`traits::ModelAdapter`]. [`scripted`] ships a deterministic adapter for
//! demos and tests.

#![warn(missing_docs, clippy::pedantic)]

pub mod scripted;
pub mod traits;

pub use scripted::ScriptedAdapter;
pub use traits::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, InferenceChunk, InferenceRequest,
    MessageRole, ModelAdapter, PromptMessage, collect_text,
};
