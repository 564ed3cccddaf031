use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::base::{ChatMessage, GenerationConfig, GenerationError, ReplyClient, Role};

/// Streaming chat-completions client for OpenAI-compatible providers.
///
/// Replies arrive as server-sent `data:` lines, each carrying one delta of
/// the assistant message, terminated by `data: [DONE]` or stream close.
pub struct OpenAiChat {
    config: GenerationConfig,
    http: reqwest::Client,
}

/// One parsed SSE chunk of a streamed completion.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        if config.api_key.is_empty() {
            return Err(GenerationError::Configuration(
                "API key is required".to_string(),
            ));
        }
        Ok(Self {
            config,
            http: reqwest::Client::new(),
        })
    }

    /// Full request message list: configured system prompt, then history.
    fn request_messages(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = &self.config.system_prompt {
            messages.push(ChatMessage::new(Role::System, prompt.clone()));
        }
        messages.extend_from_slice(history);
        messages
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

/// Extract the data payload from one SSE line, if it is a data line.
fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data: ").map(str::trim)
}

/// Extract the text delta from one SSE data payload.
///
/// Unparseable payloads are skipped; providers interleave housekeeping
/// chunks (role announcements, usage frames) that carry no text.
fn delta_text(data: &str) -> Option<String> {
    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!("Skipping unparseable stream chunk: {}", e);
            return None;
        }
    };
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
}

#[async_trait::async_trait]
impl ReplyClient for OpenAiChat {
    async fn stream_reply(
        &self,
        history: Vec<ChatMessage>,
        deltas: mpsc::Sender<String>,
    ) -> Result<(), GenerationError> {
        let body = json!({
            "model": self.config.model,
            "messages": self.request_messages(&history),
            "stream": true,
            "temperature": self.config.temperature,
        });

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!(status = %status, "generation request rejected");
            return Err(GenerationError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| GenerationError::Stream(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // Process complete lines; partial lines wait for the next chunk.
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);

                if line.is_empty() {
                    continue;
                }
                let Some(data) = sse_data(&line) else {
                    continue;
                };
                if data == "[DONE]" {
                    debug!("generation stream completed");
                    return Ok(());
                }
                if let Some(text) = delta_text(data) {
                    if deltas.send(text).await.is_err() {
                        // Receiver dropped: the session ended mid-reply.
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_api_key() {
        let result = OpenAiChat::new(GenerationConfig::default());
        assert!(matches!(result, Err(GenerationError::Configuration(_))));
    }

    #[test]
    fn sse_data_strips_prefix() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data: [DONE]"), Some("[DONE]"));
        assert_eq!(sse_data(": comment"), None);
        assert_eq!(sse_data("event: ping"), None);
    }

    #[test]
    fn delta_text_extracts_content() {
        let data = r#"{"choices":[{"delta":{"content":"Hola"}}]}"#;
        assert_eq!(delta_text(data).as_deref(), Some("Hola"));
    }

    #[test]
    fn delta_text_skips_housekeeping_chunks() {
        // Role announcement carries no content.
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(delta_text(data), None);
        // Empty deltas are dropped.
        let data = r#"{"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(delta_text(data), None);
        // Garbage is skipped, not fatal.
        assert_eq!(delta_text("not json"), None);
    }

    #[test]
    fn system_prompt_is_prepended() {
        let client = OpenAiChat::new(GenerationConfig {
            api_key: "k".to_string(),
            system_prompt: Some("Eres Nanci.".to_string()),
            ..Default::default()
        })
        .unwrap();

        let history = vec![ChatMessage::new(Role::User, "hola")];
        let messages = client.request_messages(&history);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "Eres Nanci.");
        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn completions_url_tolerates_trailing_slash() {
        let client = OpenAiChat::new(GenerationConfig {
            api_key: "k".to_string(),
            base_url: "https://api.openai.com/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}
