//! System prompt rendering for agents.

#![warn(missing_docs, clippy::pedantic)]

pub mod system;
pub mod template;

pub use system::{DEFAULT_SYSTEM_PROMPT, SystemPrompt, ToolSummary, tool_list};
pub use template::PromptTemplate;
