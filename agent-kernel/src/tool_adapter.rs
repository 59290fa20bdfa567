//! Callable view of a registered tool as seen by the model loop.

use std::sync::Arc;

use agent_prompts::ToolSummary;
use agent_tools::{ParameterResolver, ResolveError, ToolError, ToolRecord};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure of a single tool call.
#[derive(Debug, Error)]
pub enum ToolCallError {
    /// Arguments could not be resolved from the input.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The tool implementation failed.
    #[error(transparent)]
    Invoke(#[from] ToolError),
}

/// Binds a [`ToolRecord`] to a [`ParameterResolver`] so it can be called with
/// raw text and always answers with text.
#[derive(Debug, Clone)]
pub struct ToolAdapter {
    record: ToolRecord,
    resolver: Arc<ParameterResolver>,
}

impl ToolAdapter {
    /// Wraps `record`, resolving its arguments through `resolver`.
    #[must_use]
    pub fn new(record: ToolRecord, resolver: Arc<ParameterResolver>) -> Self {
        Self { record, resolver }
    }

    /// Tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.record.name()
    }

    /// Tool description.
    #[must_use]
    pub fn description(&self) -> &str {
        self.record.metadata().description()
    }

    /// Name/description pair used when rendering prompts.
    #[must_use]
    pub fn summary(&self) -> ToolSummary {
        ToolSummary::new(self.name(), self.description())
    }

    /// Resolves arguments from `input`, invokes the tool, and stringifies the result.
    ///
    /// # Errors
    ///
    /// Returns [`ToolCallError::Resolve`] when a required parameter is missing
    /// and [`ToolCallError::Invoke`] when the tool itself fails.
    pub async fn try_call(&self, input: &str) -> Result<String, ToolCallError> {
        let args = self
            .resolver
            .resolve(input, self.record.metadata().parameters())?;
        debug!(tool = %self.name(), args = %args, "invoking tool");
        let output = self.record.invoke(args).await?;
        Ok(stringify(output))
    }

    /// Like [`ToolAdapter::try_call`] but folds failures into an `Error: ...` string.
    pub async fn call(&self, input: &str) -> String {
        match self.try_call(input).await {
            Ok(output) => output,
            Err(err) => {
                warn!(tool = %self.name(), error = %err, "tool call failed");
                format!("Error: {err}")
            }
        }
    }
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_primitives::InstanceHandle;
    use agent_tools::{ParameterSchema, ParameterSpec, ParameterType, ToolMetadata};
    use serde_json::json;

    fn adder() -> ToolAdapter {
        let metadata = ToolMetadata::new("add")
            .unwrap()
            .with_description("Add two numbers")
            .with_parameters(
                ParameterSchema::new()
                    .with("a", ParameterSpec::required(ParameterType::Number, "left"))
                    .with("b", ParameterSpec::required(ParameterType::Number, "right")),
            );
        let record = ToolRecord::new(metadata, InstanceHandle::random(), |args: Value| async move {
            let a = args["a"].as_f64().unwrap_or_default();
            let b = args["b"].as_f64().unwrap_or_default();
            Ok(json!(a + b))
        });
        ToolAdapter::new(record, Arc::new(ParameterResolver::new()))
    }

    #[tokio::test]
    async fn resolves_and_stringifies() {
        let tool = adder();
        assert_eq!(tool.call("add 2 and 3.5").await, "5.5");
        assert_eq!(tool.call(r#"{"a": 1, "b": 2}"#).await, "3.0");
    }

    #[tokio::test]
    async fn missing_parameter_becomes_error_text() {
        let tool = adder();
        let output = tool.call("nothing numeric here").await;
        assert!(output.starts_with("Error: required parameter `a`"), "{output}");
        assert!(matches!(
            tool.try_call("nothing numeric here").await,
            Err(ToolCallError::Resolve(_))
        ));
    }

    #[tokio::test]
    async fn tool_failure_becomes_error_text() {
        let record = ToolRecord::new(
            ToolMetadata::new("broken").unwrap(),
            InstanceHandle::random(),
            |_args: Value| async move { Err(ToolError::execution("backend offline")) },
        );
        let tool = ToolAdapter::new(record, Arc::new(ParameterResolver::new()));
        assert_eq!(
            tool.call("anything").await,
            "Error: tool execution failed: backend offline"
        );
    }

    #[tokio::test]
    async fn string_results_pass_through_unquoted() {
        let record = ToolRecord::new(
            ToolMetadata::new("echo").unwrap(),
            InstanceHandle::random(),
            |args: Value| async move { Ok(args) },
        );
        let tool = ToolAdapter::new(record, Arc::new(ParameterResolver::new()));
        assert_eq!(tool.call("hello there").await, "hello there");
        assert_eq!(tool.summary(), ToolSummary::new("echo", ""));
    }
}
