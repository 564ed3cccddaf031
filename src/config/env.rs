use std::env;

use super::{parse_bool, ServerConfig};

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads from the process environment with sensible defaults, loading a
    /// `.env` file first if one is present.
    ///
    /// # Errors
    /// Returns an error if a variable is malformed or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        // Listener configuration
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {e}"))?;

        // Recognition provider
        let deepgram_api_key = env::var("DEEPGRAM_API_KEY").ok();
        let deepgram_url = env::var("DEEPGRAM_URL")
            .unwrap_or_else(|_| "wss://api.deepgram.com/v1/listen".to_string());
        let recognition_model =
            env::var("RECOGNITION_MODEL").unwrap_or_else(|_| "nova-2".to_string());
        let recognition_language =
            env::var("RECOGNITION_LANGUAGE").unwrap_or_else(|_| "multi".to_string());
        let smart_format = env::var("RECOGNITION_SMART_FORMAT")
            .ok()
            .and_then(|v| parse_bool(&v))
            .unwrap_or(true);
        let utterance_end_ms = parse_env_number::<u32>("UTTERANCE_END_MS", 1000)?;
        let endpointing_ms = parse_env_number::<u32>("ENDPOINTING_MS", 200)?;

        // Avatar provider
        let heygen_api_key = env::var("HEYGEN_API_KEY").ok();
        let heygen_base_url =
            env::var("HEYGEN_BASE_URL").unwrap_or_else(|_| "https://api.heygen.com/v1".to_string());

        // Generation provider
        let openai_api_key = env::var("OPENAI_API_KEY").ok();
        let openai_base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let generation_model =
            env::var("GENERATION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let system_prompt = env::var("SYSTEM_PROMPT").ok();

        // Session tuning
        let utterance_flush_ms = parse_env_number::<u64>("UTTERANCE_FLUSH_MS", 2000)?;
        let reply_settle_ms = parse_env_number::<u64>("REPLY_SETTLE_MS", 350)?;
        let history_limit = parse_env_number::<usize>("HISTORY_LIMIT", 20)?;

        let config = Self {
            host,
            port,
            deepgram_api_key,
            deepgram_url,
            recognition_model,
            recognition_language,
            smart_format,
            utterance_end_ms,
            endpointing_ms,
            heygen_api_key,
            heygen_base_url,
            openai_api_key,
            openai_base_url,
            generation_model,
            system_prompt,
            utterance_flush_ms,
            reply_settle_ms,
            history_limit,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Parse a numeric environment variable, falling back to a default when
/// unset. A set-but-malformed value is an error rather than a silent default.
fn parse_env_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| format!("Invalid {name}: {e}")),
        Err(_) => Ok(default),
    }
}
