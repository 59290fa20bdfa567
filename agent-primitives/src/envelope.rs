//! Response envelope returned from an execution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output text plus metadata describing how it was produced.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    output: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
}

impl ResponseEnvelope {
    /// Creates an envelope with the supplied output and no metadata.
    #[must_use]
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            metadata: Map::new(),
        }
    }

    /// Adds a metadata entry and returns the updated envelope.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert_metadata(key, value);
        self
    }

    /// Inserts a metadata entry, replacing any previous value for the key.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Returns the output text.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Returns the metadata map.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Looks up a single metadata value.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}
