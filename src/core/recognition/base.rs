use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A single event from the streaming recognition provider.
///
/// Events are causally sequenced per connection and each carries enough
/// information to be processed independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// The provider detected the onset of user speech.
    SpeechStarted,
    /// A provisional transcript that may still be revised.
    Interim { text: String },
    /// A finalized transcript segment. `is_end_of_speech` marks the
    /// provider's utterance boundary; an empty `text` with the flag set is a
    /// pure boundary marker.
    Final { text: String, is_end_of_speech: bool },
}

/// Configuration for a streaming recognition connection.
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// API key for the recognition provider.
    pub api_key: String,
    /// Provider WebSocket endpoint.
    pub url: String,
    /// Model to use for transcription.
    pub model: String,
    /// Language code, e.g. "multi", "es", "en-US".
    pub language: String,
    /// Smart formatting of numbers, punctuation, etc.
    pub smart_format: bool,
    /// Emit provisional transcripts while speech is still in progress.
    pub interim_results: bool,
    /// Emit speech-onset events.
    pub vad_events: bool,
    /// Provider-side quiet period before an utterance-end notification (ms).
    pub utterance_end_ms: u32,
    /// Provider-side endpointing window (ms).
    pub endpointing_ms: u32,
    /// Audio encoding, when raw audio is streamed. Containerized browser
    /// audio is detected by the provider, so this stays unset by default.
    pub encoding: Option<String>,
    /// Sample rate in Hz, required when `encoding` is set.
    pub sample_rate: Option<u32>,
    /// Channel count, when raw audio is streamed.
    pub channels: Option<u16>,
    /// Interval between keepalive frames on an otherwise quiet socket (s).
    pub keepalive_secs: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: "wss://api.deepgram.com/v1/listen".to_string(),
            model: "nova-2".to_string(),
            language: "multi".to_string(),
            smart_format: true,
            interim_results: true,
            vad_events: true,
            utterance_end_ms: 1000,
            endpointing_ms: 200,
            encoding: None,
            sample_rate: None,
            channels: None,
            keepalive_secs: 10,
        }
    }
}

/// Error types for recognition operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RecognitionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Malformed provider event: {0}")]
    MalformedEvent(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Callback invoked for each recognition event.
pub type RecognitionCallback =
    Arc<dyn Fn(RecognitionEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback invoked for streaming errors after the connection is up.
pub type RecognitionErrorCallback =
    Arc<dyn Fn(RecognitionError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Base trait for streaming recognition providers.
#[async_trait::async_trait]
pub trait BaseRecognizer: Send + Sync {
    /// Create a new instance with the given configuration.
    fn new(config: RecognizerConfig) -> Result<Self, RecognitionError>
    where
        Self: Sized;

    /// Open the provider stream.
    async fn connect(&mut self) -> Result<(), RecognitionError>;

    /// Close the provider stream.
    async fn disconnect(&mut self) -> Result<(), RecognitionError>;

    /// Whether the stream is ready to accept audio.
    fn is_ready(&self) -> bool;

    /// Send one frame of audio to the provider.
    async fn send_audio(&mut self, audio: Vec<u8>) -> Result<(), RecognitionError>;

    /// Register the event callback. May be called before or after `connect`.
    fn on_event(&self, callback: RecognitionCallback);

    /// Register the streaming-error callback.
    fn on_error(&self, callback: RecognitionErrorCallback);
}

/// Connection state for a recognition stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}
