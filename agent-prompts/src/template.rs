//! `{{variable}}` substitution over a pre-parsed template.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Text(String),
    Variable { name: String, raw: String },
}

/// A prompt template parsed into literal text and `{{name}}` placeholders.
///
/// Whitespace inside the braces is ignored, so `{{ name }}` and `{{name}}`
/// are the same variable. An unterminated `{{` is literal text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parses `source`.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let segments = parse(&source);
        Self { source, segments }
    }

    /// Returns the unparsed template text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the distinct variable names in order of first appearance.
    #[must_use]
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Variable { name, .. } = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Substitutes known variables; unknown placeholders are kept verbatim.
    #[must_use]
    pub fn render(&self, values: &HashMap<&str, String>) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Variable { name, raw } => {
                    out.push_str(values.get(name.as_str()).map_or(raw.as_str(), String::as_str));
                }
            }
        }
        out
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for PromptTemplate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for PromptTemplate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

fn parse(source: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = source;

    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            break;
        };
        let name = after_open[..close].trim();
        if name.is_empty() || name.contains('{') {
            // Not a placeholder; keep the braces as text and move past them.
            push_text(&mut segments, &rest[..open + 2]);
            rest = after_open;
            continue;
        }
        push_text(&mut segments, &rest[..open]);
        segments.push(Segment::Variable {
            name: name.to_owned(),
            raw: rest[open..open + 2 + close + 2].to_owned(),
        });
        rest = &after_open[close + 2..];
    }
    push_text(&mut segments, rest);
    segments
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Text(last)) = segments.last_mut() {
        last.push_str(text);
    } else {
        segments.push(Segment::Text(text.to_owned()));
    }
}
