use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::core::avatar::{HeygenAvatar, HeygenConfig};
use crate::core::generation::GenerationConfig;
use crate::core::recognition::RecognizerConfig;
use crate::core::session::SessionConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// Avatar provider API client, present when an API key is configured.
    pub avatar_api: Option<HeygenAvatar>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let avatar_api = config.heygen_api_key.as_ref().and_then(|api_key| {
            match HeygenAvatar::new(HeygenConfig {
                api_key: api_key.clone(),
                base_url: config.heygen_base_url.clone(),
            }) {
                Ok(client) => Some(client),
                Err(e) => {
                    tracing::warn!("Failed to initialize avatar API client: {:?}", e);
                    None
                }
            }
        });

        Arc::new(Self { config, avatar_api })
    }

    /// Session timing/sizing derived from the server configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_utterance_flush(Duration::from_millis(self.config.utterance_flush_ms))
            .with_reply_settle(Duration::from_millis(self.config.reply_settle_ms))
            .with_history_limit(self.config.history_limit)
    }

    /// Recognition stream settings for a call, with an optional per-call
    /// language override.
    ///
    /// Returns `None` when no recognition API key is configured.
    pub fn recognizer_config(&self, language: Option<String>) -> Option<RecognizerConfig> {
        let api_key = self.config.deepgram_api_key.clone()?;
        Some(RecognizerConfig {
            api_key,
            url: self.config.deepgram_url.clone(),
            model: self.config.recognition_model.clone(),
            language: language.unwrap_or_else(|| self.config.recognition_language.clone()),
            smart_format: self.config.smart_format,
            utterance_end_ms: self.config.utterance_end_ms,
            endpointing_ms: self.config.endpointing_ms,
            ..RecognizerConfig::default()
        })
    }

    /// Generation client settings for a call, with an optional per-call
    /// system-prompt override.
    ///
    /// Returns `None` when no generation API key is configured.
    pub fn generation_config(&self, system_prompt: Option<String>) -> Option<GenerationConfig> {
        let api_key = self.config.openai_api_key.clone()?;
        Some(GenerationConfig {
            api_key,
            base_url: self.config.openai_base_url.clone(),
            model: self.config.generation_model.clone(),
            system_prompt: system_prompt.or_else(|| self.config.system_prompt.clone()),
            ..GenerationConfig::default()
        })
    }
}
