//! Name-keyed heuristics that pull a single parameter value out of free text.
//!
//! These are deliberately small pattern matchers, not a language parser. Known
//! gaps are part of the contract: symbolic operators (`+`, `*`) are not an
//! operation, and place names containing punctuation (`St. Louis`) are cut at
//! the punctuation.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;

/// Extracts a value for one parameter from raw request text.
pub trait Extractor: Send + Sync {
    /// Returns the extracted value, or `None` when the text has no match.
    fn extract(&self, raw: &str) -> Option<Value>;
}

impl<F> Extractor for F
where
    F: Fn(&str) -> Option<Value> + Send + Sync,
{
    fn extract(&self, raw: &str) -> Option<Value> {
        (self)(raw)
    }
}

static PLACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:in|for|at)\s+([a-z][a-z ]*[a-z]|[a-z])").expect("valid place pattern")
});

static DOUBLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("valid quote pattern"));

// A single quote only opens a string at the start or after whitespace, so
// contractions such as "what's" are not mistaken for quotes.
static SINGLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)'([^']+)'").expect("valid quote pattern"));

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid number pattern"));

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email pattern")
});

/// Returns the first double- or single-quoted substring.
#[must_use]
pub fn quoted(raw: &str) -> Option<String> {
    DOUBLE_QUOTED
        .captures(raw)
        .or_else(|| SINGLE_QUOTED.captures(raw))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_owned())
        .filter(|s| !s.is_empty())
}

/// Matches `in|for|at <words>`, then falls back to a quoted string.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceExtractor;

impl Extractor for PlaceExtractor {
    fn extract(&self, raw: &str) -> Option<Value> {
        PLACE_PATTERN
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_owned())
            .or_else(|| quoted(raw))
            .map(Value::String)
    }
}

/// Matches the first quoted string.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotedExtractor;

impl Extractor for QuotedExtractor {
    fn extract(&self, raw: &str) -> Option<Value> {
        quoted(raw).map(Value::String)
    }
}

/// Picks the n-th decimal number in order of appearance.
#[derive(Debug, Clone, Copy)]
pub struct NumberExtractor {
    index: usize,
}

impl NumberExtractor {
    /// Creates an extractor for the zero-based `index`-th number.
    #[must_use]
    pub const fn nth(index: usize) -> Self {
        Self { index }
    }
}

impl Extractor for NumberExtractor {
    fn extract(&self, raw: &str) -> Option<Value> {
        let found = NUMBER_PATTERN.find_iter(raw).nth(self.index)?.as_str();
        number_value(found)
    }
}

pub(crate) fn number_value(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// Matches the first whole word from a fixed vocabulary, case-insensitively.
#[derive(Debug, Clone)]
pub struct VocabularyExtractor {
    pattern: Regex,
}

impl VocabularyExtractor {
    /// Builds an extractor for the supplied words.
    ///
    /// # Errors
    ///
    /// Returns the regex build error if the combined pattern exceeds the
    /// compiled-size limit.
    pub fn new<I, S>(words: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = words
            .into_iter()
            .map(|word| regex::escape(word.as_ref()))
            .collect();
        let pattern = Regex::new(&format!(r"(?i)\b({})\b", alternatives.join("|")))?;
        Ok(Self { pattern })
    }
}

impl Extractor for VocabularyExtractor {
    fn extract(&self, raw: &str) -> Option<Value> {
        self.pattern
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| Value::String(m.as_str().to_lowercase()))
    }
}

/// Matches a loose `local@domain.tld` address.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailExtractor;

impl Extractor for EmailExtractor {
    fn extract(&self, raw: &str) -> Option<Value> {
        EMAIL_PATTERN
            .find(raw)
            .map(|m| Value::String(m.as_str().to_owned()))
    }
}

/// Words the `operation` extractor recognises.
pub const OPERATION_WORDS: [&str; 4] = ["add", "subtract", "multiply", "divide"];

/// Builds the default parameter-name table.
///
/// | name                        | heuristic                        |
/// |-----------------------------|----------------------------------|
/// | `location`, `city`          | `in/for/at <words>`, else quoted |
/// | `a`, `b`                    | first / second number            |
/// | `operation`                 | [`OPERATION_WORDS`]              |
/// | `text`, `message`, `query`  | quoted string                    |
/// | `email`                     | loose email address              |
#[must_use]
pub fn default_table() -> HashMap<String, Arc<dyn Extractor>> {
    let place: Arc<dyn Extractor> = Arc::new(PlaceExtractor);
    let quoted: Arc<dyn Extractor> = Arc::new(QuotedExtractor);

    let mut table: HashMap<String, Arc<dyn Extractor>> = HashMap::new();
    table.insert("location".into(), Arc::clone(&place));
    table.insert("city".into(), place);
    table.insert("a".into(), Arc::new(NumberExtractor::nth(0)));
    table.insert("b".into(), Arc::new(NumberExtractor::nth(1)));
    if let Ok(operation) = VocabularyExtractor::new(OPERATION_WORDS) {
        table.insert("operation".into(), Arc::new(operation));
    }
    for name in ["text", "message", "query"] {
        table.insert(name.into(), Arc::clone(&quoted));
    }
    table.insert("email".into(), Arc::new(EmailExtractor));
    table
}
