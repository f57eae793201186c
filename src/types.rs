//! Shared types used across modules
//!
//! This module contains types that are used by multiple modules
//! to avoid circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user utterance paired with the assistant's reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub user_text: String,
    pub ai_text: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Exchange {
    /// Create an exchange stamped with the current time
    pub fn new(user_text: impl Into<String>, ai_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            ai_text: ai_text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Request body of the completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<Exchange>,
}

/// Successful reply body of the completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionReply {
    pub response: String,
}

/// Error body of the completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

/// Truncate a string on a char boundary, appending an ellipsis when cut
pub fn truncate_safe(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_safe() {
        assert_eq!(truncate_safe("hello", 10), "hello");
        assert_eq!(truncate_safe("hello world foo bar", 10), "hello w...");
        assert_eq!(truncate_safe("नमस्ते साथी", 4), "न...");
    }

    #[test]
    fn test_exchange_serializes_camel_case() {
        let ex = Exchange::new("hi", "नमस्ते");
        let json = serde_json::to_value(&ex).unwrap();
        assert_eq!(json["userText"], "hi");
        assert_eq!(json["aiText"], "नमस्ते");
        assert!(json.get("timestamp").is_some());
    }
}
