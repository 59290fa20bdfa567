//! Agent system prompts.

use std::collections::HashMap;

use agent_primitives::AgentMetadata;

use crate::template::PromptTemplate;

/// Template used when an agent declares no system prompt of its own.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are {{agent_name}}. {{agent_description}}\n\n\
You have access to the following tools:\n{{tools}}";

/// Name and description of a tool as listed in a system prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSummary {
    /// Tool name.
    pub name: String,
    /// One-line description.
    pub description: String,
}

impl ToolSummary {
    /// Creates a summary.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Renders an agent's system prompt.
///
/// Recognised variables are `{{agent_name}}`, `{{agent_description}}` and
/// `{{tools}}`. Other placeholders pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompt {
    template: PromptTemplate,
}

impl SystemPrompt {
    /// Wraps an explicit template.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: PromptTemplate::new(template),
        }
    }

    /// Uses the agent's own template, or [`DEFAULT_SYSTEM_PROMPT`].
    #[must_use]
    pub fn for_agent(agent: &AgentMetadata) -> Self {
        Self::new(
            agent
                .system_prompt_template()
                .unwrap_or(DEFAULT_SYSTEM_PROMPT),
        )
    }

    /// Returns the underlying template.
    #[must_use]
    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Renders the prompt for `agent` exposing `tools`.
    #[must_use]
    pub fn render(&self, agent: &AgentMetadata, tools: &[ToolSummary]) -> String {
        let values = HashMap::from([
            ("agent_name", agent.name().to_owned()),
            (
                "agent_description",
                agent.description().unwrap_or_default().to_owned(),
            ),
            ("tools", tool_list(tools)),
        ]);
        self.template.render(&values).trim().to_owned()
    }
}

/// Formats tools as a `- name: description` list.
#[must_use]
pub fn tool_list(tools: &[ToolSummary]) -> String {
    if tools.is_empty() {
        return "(none)".to_owned();
    }
    tools
        .iter()
        .map(|tool| {
            if tool.description.is_empty() {
                format!("- {}", tool.name)
            } else {
                format!("- {}: {}", tool.name, tool.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
