//! Turns raw request text into arguments for a tool's parameter schema.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, RwLock};

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::extractors::{self, Extractor, number_value};
use crate::metadata::{ParameterSchema, ParameterSpec, ParameterType};

// A JSON string literal, optionally followed by the `:` that makes it a key.
static JSON_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""((?:[^"\\]|\\.)*)"(\s*:)?"#).expect("valid json string pattern")
});

/// Result alias for argument resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Errors produced while resolving arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A required parameter could not be located in the input.
    #[error("required parameter `{parameter}` not found in input: {input}")]
    MissingParameter {
        /// Name of the missing parameter.
        parameter: String,
        /// The raw input that was being resolved.
        input: String,
    },
}

/// Resolves raw input against a [`ParameterSchema`].
///
/// Structured JSON objects are matched field-by-field; everything else goes
/// through the name-keyed extractor table. The table starts with
/// [`extractors::default_table`] and is open for registration.
pub struct ParameterResolver {
    extractors: RwLock<HashMap<String, Arc<dyn Extractor>>>,
}

impl Default for ParameterResolver {
    fn default() -> Self {
        Self {
            extractors: RwLock::new(extractors::default_table()),
        }
    }
}

impl fmt::Debug for ParameterResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self
            .extractors
            .read()
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        f.debug_struct("ParameterResolver")
            .field("extractors", &names)
            .finish()
    }
}

impl ParameterResolver {
    /// Creates a resolver with the default extractor table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a resolver with no extractors; only structured input resolves.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            extractors: RwLock::new(HashMap::new()),
        }
    }

    /// Registers (or replaces) the extractor used for parameters named `name`.
    ///
    /// # Panics
    ///
    /// Panics if the extractor table lock is poisoned.
    pub fn register(&self, name: impl Into<String>, extractor: Arc<dyn Extractor>) {
        let name = name.into();
        debug!(parameter = %name, "extractor registered");
        self.extractors
            .write()
            .expect("extractor table poisoned")
            .insert(name, extractor);
    }

    /// Returns `true` when an extractor is registered for `name`.
    ///
    /// # Panics
    ///
    /// Panics if the extractor table lock is poisoned.
    #[must_use]
    pub fn has_extractor(&self, name: &str) -> bool {
        self.extractors
            .read()
            .expect("extractor table poisoned")
            .contains_key(name)
    }

    /// Resolves `raw` into an argument value for `schema`.
    ///
    /// Returns either a JSON object keyed by parameter name or, when nothing
    /// could be assembled, a single scalar taken from the input.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::MissingParameter`] naming the first required
    /// parameter that neither a structured field nor an extractor supplied.
    pub fn resolve(&self, raw: &str, schema: &ParameterSchema) -> ResolveResult<Value> {
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(Value::Object(fields)) => self.resolve_structured(raw, &fields, schema),
            _ => self.resolve_text(raw, schema),
        }
    }

    fn resolve_structured(
        &self,
        raw: &str,
        fields: &Map<String, Value>,
        schema: &ParameterSchema,
    ) -> ResolveResult<Value> {
        let text = payload_text(raw);
        let mut args = Map::new();
        for (name, spec) in schema.iter() {
            if let Some(value) = fields.get(name) {
                args.insert(name.to_owned(), value.clone());
            } else if spec.is_required() {
                let value = self
                    .extract(name, spec, &text)
                    .ok_or_else(|| missing(name, raw))?;
                args.insert(name.to_owned(), value);
            }
        }

        if !args.is_empty() {
            debug!(parameters = args.len(), "resolved structured input");
            return Ok(Value::Object(args));
        }

        let single = fields
            .get("input")
            .cloned()
            .or_else(|| fields.values().find(|value| value.is_string()).cloned())
            .unwrap_or_else(|| Value::String(raw.to_owned()));
        debug!("structured input matched no parameters; using single value");
        Ok(single)
    }

    fn resolve_text(&self, raw: &str, schema: &ParameterSchema) -> ResolveResult<Value> {
        let mut args = Map::new();
        for (name, spec) in schema.iter() {
            match self.extract(name, spec, raw) {
                Some(value) => {
                    args.insert(name.to_owned(), value);
                }
                None if spec.is_required() => return Err(missing(name, raw)),
                None => {}
            }
        }

        if args.is_empty() {
            debug!("no parameters extracted; passing raw input through");
            return Ok(Value::String(raw.to_owned()));
        }
        debug!(parameters = args.len(), "resolved free-text input");
        Ok(Value::Object(args))
    }

    /// Runs the extractor registered for `name` and checks the value against
    /// the declared type and allowed values.
    fn extract(&self, name: &str, spec: &ParameterSpec, raw: &str) -> Option<Value> {
        let extractor = self
            .extractors
            .read()
            .expect("extractor table poisoned")
            .get(name)
            .cloned()?;
        let value = coerce(extractor.extract(raw)?, spec.kind())?;

        if let Some(allowed) = spec.allowed_values() {
            let accepted = value
                .as_str()
                .is_some_and(|candidate| allowed.iter().any(|a| a == candidate));
            if !accepted {
                debug!(parameter = %name, %value, "extracted value not in allowed set");
                return None;
            }
        }
        Some(value)
    }
}

/// Flattens a JSON payload into the text the extractors see: keys are
/// dropped and string values lose their quotes.
fn payload_text(raw: &str) -> String {
    JSON_STRING
        .replace_all(raw, |caps: &Captures<'_>| {
            if caps.get(2).is_some() {
                " ".to_owned()
            } else {
                caps[1].to_owned()
            }
        })
        .into_owned()
}

fn missing(parameter: &str, input: &str) -> ResolveError {
    ResolveError::MissingParameter {
        parameter: parameter.to_owned(),
        input: input.to_owned(),
    }
}

fn coerce(value: Value, kind: ParameterType) -> Option<Value> {
    match (kind, value) {
        (ParameterType::String, Value::String(text)) => Some(Value::String(text)),
        (ParameterType::String, Value::Number(number)) => Some(Value::String(number.to_string())),
        (ParameterType::String, Value::Bool(flag)) => Some(Value::String(flag.to_string())),
        (ParameterType::Number, Value::Number(number)) => Some(Value::Number(number)),
        (ParameterType::Number, Value::String(text)) => number_value(text.trim()),
        (ParameterType::Boolean, Value::Bool(flag)) => Some(Value::Bool(flag)),
        (ParameterType::Boolean, Value::String(text)) => {
            match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(Value::Bool(true)),
                "false" | "no" => Some(Value::Bool(false)),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn calculator() -> ParameterSchema {
        ParameterSchema::new()
            .with(
                "operation",
                ParameterSpec::required(ParameterType::String, "Operation")
                    .with_allowed_values(["add", "subtract", "multiply", "divide"]),
            )
            .with("a", ParameterSpec::required(ParameterType::Number, "First operand"))
            .with("b", ParameterSpec::required(ParameterType::Number, "Second operand"))
    }

    fn weather() -> ParameterSchema {
        ParameterSchema::new().with(
            "location",
            ParameterSpec::required(ParameterType::String, "City name"),
        )
    }

    #[test]
    fn structured_field_is_taken_verbatim() {
        let resolver = ParameterResolver::new();
        let args = resolver
            .resolve(r#"{"location": "Berlin", "units": "metric"}"#, &weather())
            .unwrap();
        assert_eq!(args, json!({ "location": "Berlin" }));
    }

    #[test]
    fn structured_gap_is_filled_from_raw_text() {
        let resolver = ParameterResolver::new();
        let args = resolver
            .resolve(r#"{"operation": "multiply", "a": 6, "note": "and 7"}"#, &calculator())
            .unwrap();
        // `b` is the second number in the raw text; `a` is the structured 6.
        assert_eq!(args, json!({ "operation": "multiply", "a": 6, "b": 7 }));
    }

    #[test]
    fn structured_missing_required_fails() {
        let resolver = ParameterResolver::new();
        let err = resolver
            .resolve(r#"{"units": "metric"}"#, &weather())
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::MissingParameter { ref parameter, .. } if parameter == "location"
        ));
    }

    #[test]
    fn structured_keys_are_never_extracted_as_values() {
        let resolver = ParameterResolver::new();
        let schema = ParameterSchema::new().with(
            "query",
            ParameterSpec::required(ParameterType::String, "Search terms"),
        );
        let err = resolver.resolve(r#"{"limit": 5}"#, &schema).unwrap_err();
        assert_eq!(
            err,
            ResolveError::MissingParameter {
                parameter: "query".into(),
                input: r#"{"limit": 5}"#.into(),
            }
        );

        let err = resolver
            .resolve(r#"{"units": "metric", "note": "sunny"}"#, &weather())
            .unwrap_err();
        assert!(err.to_string().contains("`location`"));
    }

    #[test]
    fn structured_gap_reads_string_values() {
        let resolver = ParameterResolver::new();
        let args = resolver
            .resolve(r#"{"note": "forecast for Lisbon", "days": 3}"#, &weather())
            .unwrap();
        assert_eq!(args, json!({ "location": "Lisbon" }));
    }

    #[test]
    fn payload_text_drops_keys_and_quotes() {
        assert_eq!(payload_text(r#"{"a": 6, "note": "and 7"}"#), "{  6,   and 7}");
    }

    #[test]
    fn structured_without_parameters_prefers_input_field() {
        let resolver = ParameterResolver::new();
        let schema = ParameterSchema::new();

        let args = resolver
            .resolve(r#"{"topic": "x", "input": "hello"}"#, &schema)
            .unwrap();
        assert_eq!(args, json!("hello"));

        let args = resolver.resolve(r#"{"n": 1, "topic": "rust"}"#, &schema).unwrap();
        assert_eq!(args, json!("rust"));

        let raw = r#"{"n": 1}"#;
        assert_eq!(resolver.resolve(raw, &schema).unwrap(), json!(raw));
    }

    #[test]
    fn free_text_extracts_every_parameter() {
        let resolver = ParameterResolver::new();
        let args = resolver
            .resolve("please add 2 and 40.5", &calculator())
            .unwrap();
        assert_eq!(args, json!({ "operation": "add", "a": 2, "b": 40.5 }));
    }

    #[test]
    fn symbolic_operator_is_a_known_gap() {
        let resolver = ParameterResolver::new();
        let err = resolver.resolve("what's 2 + 2?", &calculator()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::MissingParameter {
                parameter: "operation".into(),
                input: "what's 2 + 2?".into(),
            }
        );
    }

    #[test]
    fn unknown_parameter_name_never_matches_free_text() {
        let resolver = ParameterResolver::new();
        let schema = ParameterSchema::new().with(
            "ticker",
            ParameterSpec::required(ParameterType::String, "Stock symbol"),
        );
        let err = resolver.resolve("price of \"ACME\"", &schema).unwrap_err();
        assert!(err.to_string().contains("ticker"));
    }

    #[test]
    fn optional_parameters_may_be_absent() {
        let resolver = ParameterResolver::new();
        let schema = ParameterSchema::new().with(
            "email",
            ParameterSpec::optional(ParameterType::String, "Contact"),
        );
        assert_eq!(
            resolver.resolve("nothing to see", &schema).unwrap(),
            json!("nothing to see")
        );
    }

    #[test]
    fn extracted_value_must_be_allowed() {
        let resolver = ParameterResolver::new();
        let schema = ParameterSchema::new().with(
            "operation",
            ParameterSpec::required(ParameterType::String, "Operation")
                .with_allowed_values(["add"]),
        );
        assert!(resolver.resolve("divide them", &schema).is_err());
        assert_eq!(
            resolver.resolve("add them", &schema).unwrap(),
            json!({ "operation": "add" })
        );
    }

    #[test]
    fn registered_extractor_extends_table() {
        let resolver = ParameterResolver::new();
        resolver.register(
            "ticker",
            Arc::new(|raw: &str| {
                raw.split_whitespace()
                    .find(|word| word.len() > 1 && word.chars().all(|c| c.is_ascii_uppercase()))
                    .map(|word| Value::String(word.to_owned()))
            }),
        );
        let schema = ParameterSchema::new().with(
            "ticker",
            ParameterSpec::required(ParameterType::String, "Stock symbol"),
        );

        assert!(resolver.has_extractor("ticker"));
        assert_eq!(
            resolver.resolve("price of ACME today", &schema).unwrap(),
            json!({ "ticker": "ACME" })
        );
    }

    #[test]
    fn json_scalars_are_treated_as_text() {
        let resolver = ParameterResolver::new();
        let args = resolver.resolve("\"in Paris\"", &weather()).unwrap();
        assert_eq!(args, json!({ "location": "Paris" }));
    }

    #[test]
    fn empty_resolver_only_accepts_structured_input() {
        let resolver = ParameterResolver::empty();
        assert!(resolver.resolve("weather in Oslo", &weather()).is_err());
        assert_eq!(
            resolver.resolve(r#"{"location": "Oslo"}"#, &weather()).unwrap(),
            json!({ "location": "Oslo" })
        );
    }
}
