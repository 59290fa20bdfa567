//! Input validation: length, sanitization, heuristic threat patterns, and a
//! URL domain allowlist.
//!
//! The threat patterns are a pattern match over the text, not a semantic
//! analysis. Expect both false positives and false negatives.

use std::fmt;
use std::sync::LazyLock;

use agent_config::GuardSettings;
use regex::Regex;
use serde::Serialize;
use tracing::debug;
use url::Url;

/// Category of suspicious content recognised by the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThreatCategory {
    /// SQL keyword sequences.
    SqlInjection,
    /// Embedded script tags or `javascript:` URLs.
    ScriptInjection,
    /// Shell or code execution keywords.
    CommandInjection,
    /// `../` style directory traversal.
    PathTraversal,
    /// References to executable or script file types.
    SuspiciousExtension,
}

impl ThreatCategory {
    /// Every category, in detection order.
    pub const ALL: [Self; 5] = [
        Self::SqlInjection,
        Self::ScriptInjection,
        Self::CommandInjection,
        Self::PathTraversal,
        Self::SuspiciousExtension,
    ];

    /// Returns the kebab-case label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SqlInjection => "sql-injection",
            Self::ScriptInjection => "script-injection",
            Self::CommandInjection => "command-injection",
            Self::PathTraversal => "path-traversal",
            Self::SuspiciousExtension => "suspicious-extension",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Self::SqlInjection => &SQL_PATTERN,
            Self::ScriptInjection => &SCRIPT_PATTERN,
            Self::CommandInjection => &COMMAND_PATTERN,
            Self::PathTraversal => &TRAVERSAL_PATTERN,
            Self::SuspiciousExtension => &EXTENSION_PATTERN,
        }
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

static SQL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bunion\s+(?:all\s+)?select\b|\bselect\s+[\w\s,*()]+\s+from\s+\w+|\binsert\s+into\b|\bdelete\s+from\b|\bdrop\s+(?:table|database)\b|\bupdate\s+\w+\s+set\b|;\s*--",
    )
    .expect("valid sql pattern")
});

static SCRIPT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*script\b|javascript\s*:").expect("valid script pattern")
});

static COMMAND_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\brm\s+-[rf]{1,2}\b|\b(?:eval|exec|system)\s*\(|[;&|]\s*(?:rm|cat|wget|curl|sh|bash|nc)\b|\$\(",
    )
    .expect("valid command pattern")
});

static TRAVERSAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\./|\.\.\\").expect("valid traversal pattern"));

static EXTENSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(?:exe|bat|cmd|scr|pif|vbs|ps1|sh|dll|msi)\b").expect("valid extension pattern")
});

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhttps?://[^\s<>"']+"#).expect("valid url pattern"));

/// Outcome of [`InputGuard::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    sanitized: Option<String>,
    errors: Vec<String>,
}

impl ValidationReport {
    fn rejected(errors: Vec<String>) -> Self {
        Self {
            sanitized: None,
            errors,
        }
    }

    /// Returns `true` when no check produced an error.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the text that passed validation; `None` unless valid.
    #[must_use]
    pub fn sanitized_input(&self) -> Option<&str> {
        self.sanitized.as_deref()
    }

    /// Returns every problem found.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Consumes the report, returning the errors.
    #[must_use]
    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }
}

/// Strips NUL and control characters (keeping newline and tab), collapses
/// whitespace runs to a single space and trims.
///
/// Idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
#[must_use]
pub fn sanitize(input: &str) -> String {
    let stripped: String = input
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns every threat category whose pattern matches `input`.
#[must_use]
pub fn detect_threats(input: &str) -> Vec<ThreatCategory> {
    ThreatCategory::ALL
        .into_iter()
        .filter(|category| category.pattern().is_match(input))
        .collect()
}

/// Returns the `http(s)` URLs found in `input`, with trailing punctuation
/// trimmed.
#[must_use]
pub fn extract_urls(input: &str) -> Vec<&str> {
    URL_PATTERN
        .find_iter(input)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '}']))
        .collect()
}

/// Validates request text according to [`GuardSettings`].
#[derive(Debug, Clone, Default)]
pub struct InputGuard {
    max_input_length: Option<usize>,
    sanitize_input: bool,
    allowed_domains: Vec<String>,
}

impl InputGuard {
    /// Creates a guard with every optional check disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a guard from configuration.
    #[must_use]
    pub fn from_settings(settings: &GuardSettings) -> Self {
        Self::new()
            .with_max_input_length(settings.max_input_length)
            .with_sanitization(settings.sanitize_input)
            .with_allowed_domains(settings.allowed_domains.iter().cloned())
    }

    /// Sets the maximum input length in characters.
    #[must_use]
    pub fn with_max_input_length(mut self, max: Option<usize>) -> Self {
        self.max_input_length = max;
        self
    }

    /// Enables or disables sanitization.
    #[must_use]
    pub fn with_sanitization(mut self, enabled: bool) -> Self {
        self.sanitize_input = enabled;
        self
    }

    /// Sets the domain allowlist; an empty list disables the check.
    #[must_use]
    pub fn with_allowed_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_domains = domains
            .into_iter()
            .map(|d| d.into().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        self
    }

    /// Runs every check and reports all problems at once.
    ///
    /// Empty input short-circuits with a single error. Otherwise the checks
    /// run in order (length, sanitization, threat patterns, domain allowlist)
    /// and each appends to the error list.
    #[must_use]
    pub fn validate(&self, input: &str) -> ValidationReport {
        if input.trim().is_empty() {
            return ValidationReport::rejected(vec!["input must be a non-empty string".into()]);
        }

        let mut errors = Vec::new();

        if let Some(max) = self.max_input_length {
            let length = input.chars().count();
            if length > max {
                errors.push(format!(
                    "input length {length} exceeds maximum of {max} characters"
                ));
            }
        }

        let text = if self.sanitize_input {
            sanitize(input)
        } else {
            input.to_owned()
        };

        for category in detect_threats(&text) {
            errors.push(format!("potentially malicious content detected: {category}"));
        }

        if !self.allowed_domains.is_empty() {
            let disallowed: Vec<&str> = extract_urls(&text)
                .into_iter()
                .filter(|url| !self.is_allowed_url(url))
                .collect();
            if !disallowed.is_empty() {
                errors.push(format!("URLs not allowed: {}", disallowed.join(", ")));
            }
        }

        if errors.is_empty() {
            ValidationReport {
                sanitized: Some(text),
                errors,
            }
        } else {
            debug!(errors = errors.len(), "input rejected by guard");
            ValidationReport::rejected(errors)
        }
    }

    fn is_allowed_url(&self, raw: &str) -> bool {
        let Ok(url) = Url::parse(raw) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.allowed_domains.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> InputGuard {
        InputGuard::new()
            .with_max_input_length(Some(100))
            .with_sanitization(true)
            .with_allowed_domains(["example.com"])
    }

    #[test]
    fn clean_input_is_valid_and_sanitized() {
        let report = strict().validate("  What's   the weather\u{0}\u{7} in Paris?  ");
        assert!(report.is_valid());
        assert_eq!(report.sanitized_input(), Some("What's the weather in Paris?"));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let samples = [
            "a\t\tb\n\nc",
            "  \u{1b}[31mred\u{1b}[0m  ",
            "plain",
            "tab\tand\nnewline \r\n mix",
        ];
        for sample in samples {
            let once = sanitize(sample);
            assert_eq!(sanitize(&once), once, "sample {sample:?}");
        }
    }

    #[test]
    fn empty_input_short_circuits() {
        let report = strict().validate("   ");
        assert!(!report.is_valid());
        assert_eq!(report.errors().len(), 1);
    }

    #[test]
    fn errors_accumulate_across_checks() {
        let guard = InputGuard::new()
            .with_max_input_length(Some(20))
            .with_allowed_domains(["example.com"]);
        let report = guard.validate("open ../../etc/passwd and http://evil.test/x.exe");

        assert!(!report.is_valid());
        assert!(report.sanitized_input().is_none());
        let joined = report.errors().join("\n");
        assert!(joined.contains("exceeds maximum"));
        assert!(joined.contains("path-traversal"));
        assert!(joined.contains("suspicious-extension"));
        assert!(joined.contains("http://evil.test/x.exe"));
    }

    #[test]
    fn detects_each_category() {
        let cases = [
            ("1 UNION SELECT password", ThreatCategory::SqlInjection),
            ("x'; DROP TABLE users; --", ThreatCategory::SqlInjection),
            ("<script>alert(1)</script>", ThreatCategory::ScriptInjection),
            ("please run rm -rf /", ThreatCategory::CommandInjection),
            ("value $(whoami)", ThreatCategory::CommandInjection),
            ("read ..\\windows\\system32", ThreatCategory::PathTraversal),
            ("download setup.exe now", ThreatCategory::SuspiciousExtension),
        ];
        for (input, expected) in cases {
            assert!(
                detect_threats(input).contains(&expected),
                "{input:?} should match {expected}"
            );
        }
    }

    #[test]
    fn ordinary_sentences_pass() {
        for input in [
            "What's the weather in New York?",
            "please add 2 and 3",
            "Send the report to jane@example.com",
            "the address of the shop",
        ] {
            assert!(detect_threats(input).is_empty(), "{input:?}");
        }
    }

    #[test]
    fn sub_domains_are_allowed() {
        let guard = strict();
        assert!(guard.validate("see https://docs.example.com/page.").is_valid());
        assert!(guard.validate("see https://example.com").is_valid());
        assert!(!guard.validate("see https://badexample.com").is_valid());
        assert!(!guard.validate("see https://example.com.evil.io").is_valid());
    }

    #[test]
    fn no_allowlist_means_any_domain() {
        let guard = InputGuard::new();
        assert!(guard.validate("see https://anything.io").is_valid());
    }

    #[test]
    fn unsanitized_guard_returns_original_text() {
        let report = InputGuard::new().validate("  spaced   out ");
        assert_eq!(report.sanitized_input(), Some("  spaced   out "));
    }
}
