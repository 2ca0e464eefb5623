//! Chat-completion provider.
//!
//! [`ChatModel`] is the text→text black box used by the answering pipeline.
//! [`OpenAIChat`] implements it against an OpenAI-compatible
//! `/chat/completions` endpoint with the shared retry policy.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::models::{ChatMessage, Role};
use crate::openai::{self, OpenAiClient};

/// A message on the wire, including the system role that conversation
/// history never carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for PromptMessage {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role,
            content: message.content.clone(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete `messages` with `model` and return the assistant text.
    async fn complete(&self, model: &str, messages: &[PromptMessage]) -> Result<String, ChatError>;
}

pub struct OpenAIChat {
    client: OpenAiClient,
    temperature: f32,
}

impl OpenAIChat {
    pub fn new(config: &ChatConfig) -> Result<Self, ChatError> {
        let api_key = openai::api_key().ok_or_else(|| {
            ChatError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        let client = OpenAiClient::new(
            openai::base_url(config.url.as_deref()),
            api_key,
            config.timeout_secs,
            config.max_retries,
        )
        .map_err(|e| ChatError::Config(e.to_string()))?;
        Ok(Self {
            client,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    async fn complete(&self, model: &str, messages: &[PromptMessage]) -> Result<String, ChatError> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": self.temperature,
        });
        let json = self
            .client
            .post("chat/completions", &body)
            .await
            .map_err(|e| ChatError::Provider(e.to_string()))?;
        parse_completion(&json)
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String, ChatError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| ChatError::Provider("invalid response: missing choices[0].message.content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_roles_map_to_wire_roles() {
        let msg = PromptMessage::from(&ChatMessage::assistant("hi"));
        assert_eq!(msg.role, "assistant");
        let json = serde_json::to_value(PromptMessage::system("s")).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "system", "content": "s" }));
    }

    #[test]
    fn completion_content_is_extracted() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "42" } }]
        });
        assert_eq!(parse_completion(&json).unwrap(), "42");
        assert!(parse_completion(&serde_json::json!({ "choices": [] })).is_err());
    }
}
