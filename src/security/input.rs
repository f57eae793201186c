//! Learner input validation
//!
//! Everything typed by the learner passes through here before any network call:
//! control characters are stripped, whitespace is normalized, and empty, oversized
//! or suspicious input is rejected.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Markup and prompt-injection patterns that are never forwarded upstream
static SUSPICIOUS_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)<\s*/?\s*(script|iframe|object|embed|style)\b", "Markup injection"),
        (r"(?i)javascript\s*:", "Script URL"),
        (r#"(?i)<[^>]*\bon[a-z]+\s*=\s*["']?"#, "Event handler attribute"),
        (r"(?i)ignore\s+(all\s+)?(previous|prior|above)\s+(instructions?|prompts?)", "Ignore instructions"),
        (r"(?i)(reveal|print|repeat|show)\s+(your|the)\s+(system|initial)\s+(prompt|instructions?)", "System prompt extraction"),
        (r"(?i)<\|(system|user|assistant|endoftext)\|>", "Special token injection"),
        (r"(?i)```(system|assistant)\s*\n", "Delimiter injection"),
    ]
    .into_iter()
    .filter_map(|(pattern, label)| Regex::new(pattern).ok().map(|re| (re, label)))
    .collect()
});

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please type a message first.")]
    Empty,
    #[error("Message is too long ({actual} characters, limit is {max}).")]
    TooLong { max: usize, actual: usize },
    #[error("Message contains content that can't be sent ({0}).")]
    Suspicious(&'static str),
}

/// Sanitizer and length gate for learner messages
#[derive(Debug, Clone)]
pub struct InputValidator {
    max_chars: usize,
}

impl InputValidator {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Strip control characters and trim; newlines and tabs survive as spaces
    pub fn sanitize(&self, input: &str) -> String {
        let cleaned: String = input
            .chars()
            .map(|c| if c == '\n' || c == '\t' || c == '\r' { ' ' } else { c })
            .filter(|c| !c.is_control())
            .collect();
        cleaned.trim().to_string()
    }

    /// First suspicious pattern matched by `input`, if any
    pub fn detect(&self, input: &str) -> Option<&'static str> {
        SUSPICIOUS_PATTERNS
            .iter()
            .find(|(re, _)| re.is_match(input))
            .map(|(_, label)| *label)
    }

    /// Sanitize `input` and check it, returning the text that may be sent
    pub fn validate(&self, input: &str) -> Result<String, ValidationError> {
        let text = self.sanitize(input);
        if text.is_empty() {
            return Err(ValidationError::Empty);
        }

        let actual = text.chars().count();
        if actual > self.max_chars {
            return Err(ValidationError::TooLong { max: self.max_chars, actual });
        }

        if let Some(label) = self.detect(&text) {
            tracing::warn!(
                pattern = label,
                input_preview = %crate::truncate_safe(&text, 60),
                "Rejected suspicious input"
            );
            return Err(ValidationError::Suspicious(label));
        }

        Ok(text)
    }
}
