//! Model-driven tool loop.
//!
//! [`ModelOrchestrator`] is the seam between the execution pipeline and
//! whatever drives the model. [`AdapterOrchestrator`] drives any
//! [`ModelAdapter`] with a plain-text protocol:
//!
//! ```text
//! Action: <tool name>
//! Action Input: <text handed to the tool>
//! ```
//!
//! or `Final Answer: <answer>`. Tool results are fed back as observations.

use std::sync::Arc;

use agent_adapters::{
    AdapterError, InferenceRequest, MessageRole, ModelAdapter, PromptMessage, collect_text,
};
use agent_config::DEFAULT_MAX_ITERATIONS;
use agent_primitives::{AgentMetadata, ConversationTurn};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::tool_adapter::ToolAdapter;

/// Output reported when the loop runs out of iterations.
pub const STOPPED_SENTINEL: &str = "Agent stopped due to max iterations.";

const FINAL_ANSWER: &str = "Final Answer:";
const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const OBSERVATION: &str = "Observation:";

const PROTOCOL: &str = "\n\nTo use a tool, reply with exactly:\n\
Action: <tool name>\n\
Action Input: <input for the tool>\n\n\
When you know the answer, reply with:\n\
Final Answer: <answer>";

/// Result alias for orchestration.
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Failures raised by the model loop.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The model adapter failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    /// Orchestration could not run for another reason.
    #[error("orchestration failed: {reason}")]
    Failed {
        /// Human-readable reason.
        reason: String,
    },
}

impl OrchestrationError {
    /// Creates a generic failure.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Everything the model loop needs for one request.
#[derive(Debug, Clone)]
pub struct OrchestrationRequest {
    /// Agent being executed.
    pub agent: AgentMetadata,
    /// Rendered system prompt.
    pub system_prompt: String,
    /// Tools the model may call.
    pub tools: Vec<ToolAdapter>,
    /// Request text.
    pub input: String,
    /// Earlier turns of the conversation.
    pub history: Vec<ConversationTurn>,
}

/// What the model loop produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationOutcome {
    /// Answer text, or [`STOPPED_SENTINEL`].
    pub output: String,
    /// `true` when the loop ended without a final answer.
    pub stopped_without_answer: bool,
}

impl OrchestrationOutcome {
    /// Outcome carrying a final answer.
    #[must_use]
    pub fn answered(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            stopped_without_answer: false,
        }
    }

    /// Outcome for an exhausted loop.
    #[must_use]
    pub fn stopped() -> Self {
        Self {
            output: STOPPED_SENTINEL.to_owned(),
            stopped_without_answer: true,
        }
    }

    /// Returns `true` when the output can be handed to the caller as is.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.stopped_without_answer
            && !self.output.trim().is_empty()
            && self.output != STOPPED_SENTINEL
    }
}

/// Drives a model with a set of tools until it answers or gives up.
#[async_trait]
pub trait ModelOrchestrator: Send + Sync {
    /// Runs the loop for one request.
    async fn invoke(&self, request: OrchestrationRequest)
    -> OrchestrationResult<OrchestrationOutcome>;
}

/// [`ModelOrchestrator`] over a [`ModelAdapter`].
#[derive(Clone)]
pub struct AdapterOrchestrator {
    adapter: Arc<dyn ModelAdapter>,
    max_iterations: usize,
}

impl std::fmt::Debug for AdapterOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let metadata = self.adapter.metadata();
        f.debug_struct("AdapterOrchestrator")
            .field("provider", &metadata.provider())
            .field("model", &metadata.model())
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

impl AdapterOrchestrator {
    /// Creates an orchestrator with the default iteration cap.
    #[must_use]
    pub fn new(adapter: Arc<dyn ModelAdapter>) -> Self {
        Self {
            adapter,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Overrides the iteration cap. Zero is treated as one.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Returns the iteration cap.
    #[must_use]
    pub const fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    async fn complete(
        &self,
        agent: &AgentMetadata,
        system_prompt: &str,
        messages: &[PromptMessage],
    ) -> OrchestrationResult<String> {
        let request = InferenceRequest::new(messages.to_vec())?
            .with_agent_settings(agent)
            .with_system_prompt(system_prompt)
            .with_stop([OBSERVATION]);
        let stream = self.adapter.infer(request).await?;
        Ok(collect_text(stream).await?)
    }
}

#[async_trait]
impl ModelOrchestrator for AdapterOrchestrator {
    async fn invoke(
        &self,
        request: OrchestrationRequest,
    ) -> OrchestrationResult<OrchestrationOutcome> {
        let system_prompt = format!("{}{PROTOCOL}", request.system_prompt);
        let mut messages: Vec<PromptMessage> =
            request.history.iter().map(PromptMessage::from).collect();
        messages.push(PromptMessage::new(MessageRole::User, request.input.clone()));

        for iteration in 1..=self.max_iterations {
            let reply = self
                .complete(&request.agent, &system_prompt, &messages)
                .await?;
            debug!(agent = %request.agent.name(), iteration, "model replied");

            match parse_reply(&reply) {
                Reply::Final(answer) => return Ok(OrchestrationOutcome::answered(answer)),
                Reply::Action { tool, input } => {
                    let observation = match request.tools.iter().find(|t| t.name() == tool) {
                        Some(adapter) => adapter.call(&input).await,
                        None => {
                            warn!(agent = %request.agent.name(), tool = %tool, "model asked for an unknown tool");
                            format!("Error: unknown tool `{tool}`")
                        }
                    };
                    messages.push(PromptMessage::new(MessageRole::Assistant, reply.trim()));
                    messages.push(PromptMessage::new(
                        MessageRole::Tool,
                        format!("{OBSERVATION} {observation}"),
                    ));
                }
                Reply::Empty => {
                    debug!(agent = %request.agent.name(), iteration, "empty model reply");
                }
            }
        }

        warn!(
            agent = %request.agent.name(),
            max_iterations = self.max_iterations,
            "tool loop exhausted without a final answer"
        );
        Ok(OrchestrationOutcome::stopped())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Final(String),
    Action { tool: String, input: String },
    Empty,
}

/// Replies with neither marker are taken as the final answer.
fn parse_reply(text: &str) -> Reply {
    if let Some(index) = text.find(FINAL_ANSWER) {
        return Reply::Final(text[index + FINAL_ANSWER.len()..].trim().to_owned());
    }

    let tool = text
        .lines()
        .find_map(|line| line.trim_start().strip_prefix(ACTION))
        .map(str::trim);
    if let Some(tool) = tool.filter(|tool| !tool.is_empty()) {
        let input = text
            .find(ACTION_INPUT)
            .map(|index| {
                let rest = &text[index + ACTION_INPUT.len()..];
                rest.split(OBSERVATION).next().unwrap_or(rest).trim()
            })
            .unwrap_or_default();
        return Reply::Action {
            tool: tool.to_owned(),
            input: input.to_owned(),
        };
    }

    let text = text.trim();
    if text.is_empty() {
        Reply::Empty
    } else {
        Reply::Final(text.to_owned())
    }
}
