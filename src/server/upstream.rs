//! Upstream AI completion service

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::types::Exchange;

/// Something that turns a message plus recent history into a reply
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, message: &str, history: &[Exchange]) -> Result<String>;

    /// Model identifier reported by the status endpoint
    fn model(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self { role: role.to_string(), content: content.into() }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

/// System prompt, then each exchange as a user/assistant pair, then the new message
pub fn build_messages(system_prompt: &str, history: &[Exchange], message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    if !system_prompt.is_empty() {
        messages.push(ChatMessage::new("system", system_prompt));
    }
    for exchange in history {
        messages.push(ChatMessage::new("user", exchange.user_text.as_str()));
        messages.push(ChatMessage::new("assistant", exchange.ai_text.as_str()));
    }
    messages.push(ChatMessage::new("user", message));
    messages
}

/// Extract the reply text from a chat-completions response body
pub fn extract_content(body: &Value) -> Option<String> {
    let content = body
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?;

    let text = match content {
        Value::String(s) => Some(s.clone()),
        // Array-of-parts format
        Value::Array(parts) => {
            let text: String = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("");
            Some(text)
        }
        _ => None,
    };
    text.filter(|text| !text.trim().is_empty())
}

/// OpenAI-compatible chat-completions client
pub struct OpenAiCompatible {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl OpenAiCompatible {
    pub fn new(config: &UpstreamConfig, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatible {
    async fn complete(&self, message: &str, history: &[Exchange]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: build_messages(&self.system_prompt, history, message),
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to AI service")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response body")?;
        if !status.is_success() {
            bail!("AI service error ({}): {}", status, crate::truncate_safe(&body, 300));
        }

        let raw: Value = serde_json::from_str(&body).map_err(|e| {
            anyhow::anyhow!("Failed to parse AI service response: {} (body: {})", e, crate::truncate_safe(&body, 300))
        })?;

        extract_content(&raw).context("AI service response has no message content")
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_messages_interleaves_history() {
        let history = vec![Exchange::new("नमस्ते", "नमस्ते! Hello!")];
        let messages = build_messages("Be a tutor.", &history, "धन्यवाद");

        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[3].content, "धन्यवाद");
    }

    #[test]
    fn test_build_messages_without_system_prompt() {
        let messages = build_messages("", &[], "hi");
        assert_eq!(messages, vec![ChatMessage::new("user", "hi")]);
    }

    #[test]
    fn test_extract_string_content() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "राम्रो!"}}]});
        assert_eq!(extract_content(&body).as_deref(), Some("राम्रो!"));
    }

    #[test]
    fn test_extract_array_content() {
        let body = json!({"choices": [{"message": {"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]}}]});
        assert_eq!(extract_content(&body).as_deref(), Some("ab"));
    }

    #[test]
    fn test_extract_rejects_missing_or_blank() {
        assert!(extract_content(&json!({"choices": []})).is_none());
        assert!(extract_content(&json!({"choices": [{"message": {"content": "  "}}]})).is_none());
        assert!(extract_content(&json!({"error": "x"})).is_none());
    }
}
