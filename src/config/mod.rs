//! Server configuration.
//!
//! Configuration is loaded from environment variables (with `.env` support)
//! and validated before the server starts. Timing knobs for the session core
//! are plain environment variables so deployments (and tests) can tune
//! them without code changes.

mod env;
mod utils;

pub use utils::parse_bool;

/// Server configuration.
///
/// Contains everything needed to run the server:
/// - listener settings (host, port)
/// - recognition provider settings (key, endpoint, live options)
/// - avatar provider settings (key, base URL)
/// - generation provider settings (key, base URL, model, system prompt)
/// - session timing knobs and history cap
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Listener settings
    pub host: String,
    pub port: u16,

    // Recognition provider
    pub deepgram_api_key: Option<String>,
    pub deepgram_url: String,
    pub recognition_model: String,
    pub recognition_language: String,
    pub smart_format: bool,
    pub utterance_end_ms: u32,
    pub endpointing_ms: u32,

    // Avatar provider
    pub heygen_api_key: Option<String>,
    pub heygen_base_url: String,

    // Generation provider
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub generation_model: String,
    pub system_prompt: Option<String>,

    // Session tuning
    pub utterance_flush_ms: u64,
    pub reply_settle_ms: u64,
    pub history_limit: usize,
}

impl ServerConfig {
    /// Listener address in `host:port` form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the loaded configuration.
    ///
    /// Timing windows of zero would turn the debounce policies into
    /// immediate flushes, so they are rejected up front.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.utterance_flush_ms == 0 {
            return Err("UTTERANCE_FLUSH_MS must be greater than zero".to_string());
        }
        if self.reply_settle_ms == 0 {
            return Err("REPLY_SETTLE_MS must be greater than zero".to_string());
        }
        if self.history_limit == 0 {
            return Err("HISTORY_LIMIT must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ServerConfig {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 3001,
            deepgram_api_key: None,
            deepgram_url: "wss://api.deepgram.com/v1/listen".to_string(),
            recognition_model: "nova-2".to_string(),
            recognition_language: "multi".to_string(),
            smart_format: true,
            utterance_end_ms: 1000,
            endpointing_ms: 200,
            heygen_api_key: None,
            heygen_base_url: "https://api.heygen.com/v1".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            generation_model: "gpt-4o-mini".to_string(),
            system_prompt: None,
            utterance_flush_ms: 2000,
            reply_settle_ms: 350,
            history_limit: 20,
        }
    }

    #[test]
    fn address_joins_host_and_port() {
        let config = base_config();
        assert_eq!(config.address(), "0.0.0.0:3001");
    }

    #[test]
    fn zero_windows_are_rejected() {
        let mut config = base_config();
        config.utterance_flush_ms = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.reply_settle_ms = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.history_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }
}
