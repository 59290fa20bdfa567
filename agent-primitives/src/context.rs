//! Request context passed through the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Speaker of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// System instructions.
    System,
    /// End-user content.
    User,
    /// Prior model output.
    Assistant,
}

/// A single entry of conversation history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    role: TurnRole,
    content: String,
}

impl ConversationTurn {
    /// Creates a turn.
    #[must_use]
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Returns the speaker role.
    #[must_use]
    pub const fn role(&self) -> TurnRole {
        self.role
    }

    /// Returns the turn content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Per-request input handed to the orchestrator.
///
/// Contexts are values: pipeline stages that want to change one return a new
/// context built from a clone, leaving the caller's copy untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    input: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    history: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
}

impl RequestContext {
    /// Creates a context for the supplied input text.
    #[must_use]
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }

    /// Returns a copy of this context carrying a different input.
    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    /// Replaces the conversation history.
    #[must_use]
    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    /// Sets the session identifier.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns the request text.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Returns the conversation history.
    #[must_use]
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Returns the free-form metadata.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Returns a metadata entry as a string slice when it holds a string.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn with_input_leaves_original_untouched() {
        let original = RequestContext::new("raw")
            .with_session_id("s-1")
            .with_metadata("ip", json!("10.0.0.1"));
        let rewritten = original.clone().with_input("clean");

        assert_eq!(original.input(), "raw");
        assert_eq!(rewritten.input(), "clean");
        assert_eq!(rewritten.session_id(), Some("s-1"));
        assert_eq!(rewritten.metadata_str("ip"), Some("10.0.0.1"));
    }

    #[test]
    fn deserializes_history() {
        let ctx: RequestContext = serde_json::from_value(json!({
            "input": "hi",
            "history": [{"role": "user", "content": "earlier"}]
        }))
        .unwrap();

        assert_eq!(ctx.history().len(), 1);
        assert_eq!(ctx.history()[0].role(), TurnRole::User);
        assert!(ctx.metadata().is_empty());
    }
}
