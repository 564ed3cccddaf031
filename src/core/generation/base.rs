use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Speaker role of one conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Configuration for the generation provider.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// API key for the generation provider.
    pub api_key: String,
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Optional system prompt prepended to every request.
    pub system_prompt: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            system_prompt: None,
        }
    }
}

/// Error types for generation operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// A streaming reply provider.
///
/// One call streams one reply: text deltas are pushed through `deltas` in
/// emission order, and the call returns once the provider closes the stream.
/// A dropped receiver ends the call without error; the session is gone and
/// the remainder of the reply is moot.
#[async_trait::async_trait]
pub trait ReplyClient: Send + Sync {
    async fn stream_reply(
        &self,
        history: Vec<ChatMessage>,
        deltas: mpsc::Sender<String>,
    ) -> Result<(), GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let message = ChatMessage::new(Role::Assistant, "hola");
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hola"}"#);
    }

    #[test]
    fn default_config_targets_openai() {
        let config = GenerationConfig::default();
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert!(config.system_prompt.is_none());
    }
}
