//! Agent and tool storage plus argument resolution.
//!
//! [`registry`] holds the process-lifetime agent and tool records,
//! [`metadata`] describes a tool and its parameter schema, and [`resolver`]
//! turns free-form or JSON input into arguments for a given schema using the
//! name-keyed heuristics in [`extractors`].

#![warn(missing_docs, clippy::pedantic)]

pub mod extractors;
pub mod metadata;
pub mod registry;
pub mod resolver;

pub use extractors::Extractor;
pub use metadata::{ParameterSchema, ParameterSpec, ParameterType, ToolMetadata};
pub use registry::{Registry, Tool, ToolError, ToolRecord, ToolResult};
pub use resolver::{ParameterResolver, ResolveError, ResolveResult};
