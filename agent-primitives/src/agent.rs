//! Agent metadata held by the registry.

use serde::{Deserialize, Serialize};

use crate::{Error, InstanceHandle, Result};

const MAX_TEMPERATURE: f32 = 2.0;

/// Declarative description of an agent: identity plus model configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system_prompt_template: Option<String>,
}

impl AgentMetadata {
    /// Starts building agent metadata.
    #[must_use]
    pub fn builder() -> AgentMetadataBuilder {
        AgentMetadataBuilder::default()
    }

    /// Returns the unique agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the model identifier, if one was configured.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Returns the sampling temperature.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Returns the output token budget.
    #[must_use]
    pub const fn max_output_tokens(&self) -> Option<u32> {
        self.max_output_tokens
    }

    /// Returns the raw system prompt template.
    #[must_use]
    pub fn system_prompt_template(&self) -> Option<&str> {
        self.system_prompt_template.as_deref()
    }
}

/// Builder for [`AgentMetadata`].
#[derive(Debug, Default)]
pub struct AgentMetadataBuilder {
    name: Option<String>,
    description: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    system_prompt_template: Option<String>,
}

impl AgentMetadataBuilder {
    /// Sets the agent name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMetadata`] when the name is empty.
    pub fn name(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidMetadata {
                reason: "agent name cannot be empty".into(),
            });
        }
        self.name = Some(name);
        Ok(self)
    }

    /// Sets an optional description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the sampling temperature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMetadata`] when the value falls outside `0.0..=2.0`.
    pub fn temperature(mut self, temperature: f32) -> Result<Self> {
        if !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(Error::InvalidMetadata {
                reason: format!("temperature must be within 0.0..={MAX_TEMPERATURE}"),
            });
        }
        self.temperature = Some(temperature);
        Ok(self)
    }

    /// Sets the output token budget.
    #[must_use]
    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Sets the system prompt template.
    #[must_use]
    pub fn system_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.system_prompt_template = Some(template.into());
        self
    }

    /// Consumes the builder and returns the metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMetadata`] if no name was provided.
    pub fn build(self) -> Result<AgentMetadata> {
        let name = self.name.ok_or_else(|| Error::InvalidMetadata {
            reason: "agent name must be provided".into(),
        })?;

        Ok(AgentMetadata {
            name,
            description: self.description,
            model: self.model,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            system_prompt_template: self.system_prompt_template,
        })
    }
}

/// Registry entry pairing agent metadata with the handle of its implementation.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentRecord {
    metadata: AgentMetadata,
    instance: InstanceHandle,
}

impl AgentRecord {
    /// Creates a new record.
    #[must_use]
    pub fn new(metadata: AgentMetadata, instance: InstanceHandle) -> Self {
        Self { metadata, instance }
    }

    /// Returns the agent metadata.
    #[must_use]
    pub fn metadata(&self) -> &AgentMetadata {
        &self.metadata
    }

    /// Returns the agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    /// Returns the handle of the agent implementation.
    #[must_use]
    pub const fn instance(&self) -> InstanceHandle {
        self.instance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_metadata() {
        let metadata = AgentMetadata::builder()
            .name("weather")
            .unwrap()
            .description("Weather lookups")
            .model("gpt-4o-mini")
            .temperature(0.2)
            .unwrap()
            .max_output_tokens(512)
            .system_prompt_template("You are {{agent_name}}.")
            .build()
            .unwrap();

        assert_eq!(metadata.name(), "weather");
        assert_eq!(metadata.description(), Some("Weather lookups"));
        assert_eq!(metadata.model(), Some("gpt-4o-mini"));
        assert_eq!(metadata.temperature(), Some(0.2));
        assert_eq!(metadata.max_output_tokens(), Some(512));
        assert!(metadata.system_prompt_template().is_some());
    }

    #[test]
    fn name_is_required() {
        assert!(AgentMetadata::builder().build().is_err());
        assert!(AgentMetadata::builder().name("  ").is_err());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let err = AgentMetadata::builder()
            .name("hot")
            .unwrap()
            .temperature(3.5)
            .expect_err("temperature should be rejected");
        assert!(matches!(err, Error::InvalidMetadata { .. }));
    }
}
