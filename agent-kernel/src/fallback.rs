//! Heuristic tool dispatch used when the model loop gives up.
//!
//! This is a linear scan in registration order with a purely textual
//! relevance test. The first relevant tool that succeeds wins.

use tracing::{debug, info, warn};

use crate::tool_adapter::ToolAdapter;

/// Output returned when no tool matched or every matching tool failed.
pub const FALLBACK_APOLOGY: &str =
    "I apologize, but I couldn't find a suitable tool to handle your request.";

/// Returns `true` when `input` mentions the tool.
///
/// All comparisons are case-insensitive substring checks against the raw
/// input: the full name, any hyphen-separated token of the name, or any
/// description word longer than three characters.
#[must_use]
pub fn is_relevant(name: &str, description: &str, input: &str) -> bool {
    let input = input.to_lowercase();
    let name = name.to_lowercase();

    if input.contains(&name) {
        return true;
    }
    if name
        .split('-')
        .filter(|token| !token.is_empty())
        .any(|token| input.contains(token))
    {
        return true;
    }
    description
        .split_whitespace()
        .filter(|word| word.chars().count() > 3)
        .any(|word| input.contains(&word.to_lowercase()))
}

/// Result of a fallback dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackOutcome {
    /// Text to return to the caller.
    pub output: String,
    /// Tool that produced the output, if any.
    pub tool: Option<String>,
}

impl FallbackOutcome {
    /// Returns `true` when no tool produced a result.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.tool.is_none()
    }
}

/// Invokes the first relevant tool directly with the raw input.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackDispatcher;

impl FallbackDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Scans `tools` in order and returns the first successful relevant result.
    pub async fn dispatch(&self, tools: &[ToolAdapter], input: &str) -> FallbackOutcome {
        for tool in tools {
            if !is_relevant(tool.name(), tool.description(), input) {
                continue;
            }
            debug!(tool = %tool.name(), "fallback candidate");
            match tool.try_call(input).await {
                Ok(result) => {
                    info!(tool = %tool.name(), "fallback produced a result");
                    return FallbackOutcome {
                        output: format!("Based on the {} information: {result}", tool.name()),
                        tool: Some(tool.name().to_owned()),
                    };
                }
                Err(err) => {
                    warn!(tool = %tool.name(), error = %err, "fallback tool failed; trying next");
                }
            }
        }

        info!(candidates = tools.len(), "fallback exhausted");
        FallbackOutcome {
            output: FALLBACK_APOLOGY.to_owned(),
            tool: None,
        }
    }
}
