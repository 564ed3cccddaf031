use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::RwLock as SyncRwLock;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};
use url::Url;

use super::base::{
    BaseRecognizer, LinkState, RecognitionCallback, RecognitionError, RecognitionErrorCallback,
    RecognitionEvent, RecognizerConfig,
};

/// A raw WebSocket connection to the recognition provider.
pub type ProviderSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Keepalive control frame the provider expects on quiet sockets.
pub const KEEPALIVE_FRAME: &str = r#"{"type":"KeepAlive"}"#;

/// Build the provider WebSocket URL with query parameters from config.
pub fn listen_url(config: &RecognizerConfig) -> Result<String, RecognitionError> {
    let mut url = Url::parse(&config.url)
        .map_err(|e| RecognitionError::ConfigurationError(format!("Invalid WebSocket URL: {e}")))?;

    {
        let mut query_pairs = url.query_pairs_mut();
        query_pairs.append_pair("model", &config.model);
        query_pairs.append_pair("language", &config.language);
        query_pairs.append_pair("smart_format", &config.smart_format.to_string());
        query_pairs.append_pair("interim_results", &config.interim_results.to_string());
        query_pairs.append_pair("vad_events", &config.vad_events.to_string());
        query_pairs.append_pair("utterance_end_ms", &config.utterance_end_ms.to_string());
        query_pairs.append_pair("endpointing", &config.endpointing_ms.to_string());

        // Raw-audio parameters only apply when the caller streams PCM; for
        // containerized browser audio the provider detects the format.
        if let Some(encoding) = &config.encoding {
            query_pairs.append_pair("encoding", encoding);
        }
        if let Some(sample_rate) = config.sample_rate {
            query_pairs.append_pair("sample_rate", &sample_rate.to_string());
        }
        if let Some(channels) = config.channels {
            query_pairs.append_pair("channels", &channels.to_string());
        }
    }

    Ok(url.to_string())
}

/// Open an authenticated socket to the provider.
///
/// Shared by the streaming recognizer and the verbatim relay.
pub async fn open_provider_socket(
    config: &RecognizerConfig,
) -> Result<ProviderSocket, RecognitionError> {
    if config.api_key.is_empty() {
        return Err(RecognitionError::AuthenticationFailed(
            "API key is required".to_string(),
        ));
    }

    let ws_url = listen_url(config)?;
    let request = tokio_tungstenite::tungstenite::http::Request::builder()
        .uri(&ws_url)
        .header("Authorization", format!("token {}", config.api_key))
        .header("Sec-WebSocket-Protocol", "token")
        .body(())
        .map_err(|e| RecognitionError::ConfigurationError(format!("Invalid request: {e}")))?;

    let (socket, _) = connect_async(request)
        .await
        .map_err(|e| RecognitionError::ConnectionFailed(e.to_string()))?;
    Ok(socket)
}

/// Transcription response envelope from the provider.
#[derive(Debug, Deserialize)]
pub struct ListenResponse {
    #[serde(rename = "type")]
    pub response_type: String,
    pub channel: Option<ListenChannel>,
    pub is_final: Option<bool>,
    pub speech_final: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListenChannel {
    pub alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
pub struct ListenAlternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Provider error payload.
#[derive(Debug, Deserialize)]
struct ListenError {
    description: Option<String>,
    message: Option<String>,
}

/// Map one provider payload onto a recognition event.
///
/// `UtteranceEnd` carries no transcript and becomes the empty end-of-speech
/// boundary marker; unknown response types map to nothing.
pub fn recognition_event(response: &ListenResponse) -> Option<RecognitionEvent> {
    match response.response_type.as_str() {
        "Results" => {
            let alternative = response.channel.as_ref()?.alternatives.first()?;
            let text = alternative.transcript.clone();
            if response.is_final.unwrap_or(false) {
                Some(RecognitionEvent::Final {
                    text,
                    is_end_of_speech: response.speech_final.unwrap_or(false),
                })
            } else {
                Some(RecognitionEvent::Interim { text })
            }
        }
        "SpeechStarted" => Some(RecognitionEvent::SpeechStarted),
        "UtteranceEnd" => Some(RecognitionEvent::Final {
            text: String::new(),
            is_end_of_speech: true,
        }),
        _ => None,
    }
}

/// Streaming recognition client over the provider's listen WebSocket.
pub struct DeepgramRecognizer {
    config: RecognizerConfig,
    state: Arc<RwLock<LinkState>>,
    /// Sender for outgoing frames into the connection task.
    ws_sender: Option<mpsc::UnboundedSender<Message>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    /// Callback slots shared with the connection task, so registration works
    /// before or after connect without reopening the stream.
    event_callback: Arc<SyncRwLock<Option<RecognitionCallback>>>,
    error_callback: Arc<SyncRwLock<Option<RecognitionErrorCallback>>>,
    connection_handle: Option<tokio::task::JoinHandle<()>>,
}

impl DeepgramRecognizer {
    async fn start_connection(&mut self) -> Result<(), RecognitionError> {
        let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<Message>();
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        self.ws_sender = Some(ws_tx);
        self.shutdown_tx = Some(shutdown_tx);

        let config = self.config.clone();
        let state = self.state.clone();
        let event_callback = self.event_callback.clone();
        let error_callback = self.error_callback.clone();

        let connection_handle = tokio::spawn(async move {
            {
                let mut state_guard = state.write().await;
                *state_guard = LinkState::Connecting;
            }

            let socket = match open_provider_socket(&config).await {
                Ok(socket) => socket,
                Err(e) => {
                    error!("Failed to connect to recognition provider: {}", e);
                    let mut state_guard = state.write().await;
                    *state_guard = LinkState::Error(e.to_string());
                    return;
                }
            };

            info!("Connected to recognition provider");
            {
                let mut state_guard = state.write().await;
                *state_guard = LinkState::Connected;
            }

            let (mut ws_sink, mut ws_stream) = socket.split();
            let mut keepalive =
                tokio::time::interval(Duration::from_secs(config.keepalive_secs.max(1)));
            keepalive.tick().await; // first tick completes immediately

            loop {
                tokio::select! {
                    // Outgoing audio frames
                    Some(message) = ws_rx.recv() => {
                        if let Err(e) = ws_sink.send(message).await {
                            error!("Failed to send frame to provider: {}", e);
                            break;
                        }
                    }

                    // Incoming provider events
                    message = ws_stream.next() => {
                        match message {
                            Some(Ok(msg)) => {
                                handle_provider_message(msg, &event_callback, &error_callback).await;
                            }
                            Some(Err(e)) => {
                                error!("Recognition stream error: {}", e);
                                let callback = error_callback.read().clone();
                                if let Some(callback) = callback {
                                    callback(RecognitionError::NetworkError(e.to_string())).await;
                                }
                                break;
                            }
                            None => {
                                info!("Recognition stream ended");
                                break;
                            }
                        }
                    }

                    // Keep the provider socket alive between audio bursts
                    _ = keepalive.tick() => {
                        debug!("recognition keepalive");
                        if ws_sink.send(Message::Text(KEEPALIVE_FRAME.into())).await.is_err() {
                            break;
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        info!("Recognition stream shutting down");
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            {
                let mut state_guard = state.write().await;
                *state_guard = LinkState::Disconnected;
            }
        });

        self.connection_handle = Some(connection_handle);

        // Wait for the link to come up before accepting audio.
        let mut attempts = 0;
        while attempts < 50 {
            {
                let state = self.state.read().await;
                match &*state {
                    LinkState::Connected => return Ok(()),
                    LinkState::Error(message) => {
                        return Err(RecognitionError::ConnectionFailed(message.clone()));
                    }
                    _ => {}
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            attempts += 1;
        }

        Err(RecognitionError::ConnectionFailed(
            "Connection timeout".to_string(),
        ))
    }
}

/// Dispatch one provider frame to the registered callbacks.
///
/// Malformed payloads are reported through the error callback and skipped;
/// they never tear the stream down.
async fn handle_provider_message(
    message: Message,
    event_callback: &Arc<SyncRwLock<Option<RecognitionCallback>>>,
    error_callback: &Arc<SyncRwLock<Option<RecognitionErrorCallback>>>,
) {
    match message {
        Message::Text(text) => {
            let response: ListenResponse = match serde_json::from_str(&text) {
                Ok(response) => response,
                Err(e) => {
                    warn!("Malformed provider event, skipping: {}", e);
                    let callback = error_callback.read().clone();
                    if let Some(callback) = callback {
                        callback(RecognitionError::MalformedEvent(e.to_string())).await;
                    }
                    return;
                }
            };

            if response.response_type == "Error" {
                let detail = serde_json::from_str::<ListenError>(&text)
                    .ok()
                    .and_then(|e| e.description.or(e.message))
                    .unwrap_or_else(|| "unknown provider error".to_string());
                error!("Provider error event: {}", detail);
                let callback = error_callback.read().clone();
                if let Some(callback) = callback {
                    callback(RecognitionError::ProviderError(detail)).await;
                }
                return;
            }

            if response.response_type == "Metadata" {
                debug!("Provider metadata event");
                return;
            }

            if let Some(event) = recognition_event(&response) {
                let callback = event_callback.read().clone();
                if let Some(callback) = callback {
                    callback(event).await;
                }
            } else {
                debug!("Ignoring provider event type {}", response.response_type);
            }
        }
        Message::Binary(data) => {
            warn!("Unexpected binary frame from provider: {} bytes", data.len());
        }
        Message::Close(frame) => {
            info!("Provider closed the stream: {:?}", frame);
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
    }
}

impl Default for DeepgramRecognizer {
    fn default() -> Self {
        Self {
            config: RecognizerConfig::default(),
            state: Arc::new(RwLock::new(LinkState::Disconnected)),
            ws_sender: None,
            shutdown_tx: None,
            event_callback: Arc::new(SyncRwLock::new(None)),
            error_callback: Arc::new(SyncRwLock::new(None)),
            connection_handle: None,
        }
    }
}

#[async_trait::async_trait]
impl BaseRecognizer for DeepgramRecognizer {
    fn new(config: RecognizerConfig) -> Result<Self, RecognitionError> {
        if config.api_key.is_empty() {
            return Err(RecognitionError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        Ok(Self {
            config,
            state: Arc::new(RwLock::new(LinkState::Disconnected)),
            ws_sender: None,
            shutdown_tx: None,
            event_callback: Arc::new(SyncRwLock::new(None)),
            error_callback: Arc::new(SyncRwLock::new(None)),
            connection_handle: None,
        })
    }

    async fn connect(&mut self) -> Result<(), RecognitionError> {
        self.start_connection().await?;
        info!("Recognition stream ready");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), RecognitionError> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(());
        }
        if let Some(handle) = self.connection_handle.take() {
            let _ = timeout(Duration::from_secs(5), handle).await;
        }

        self.ws_sender = None;
        self.shutdown_tx = None;
        {
            let mut state = self.state.write().await;
            *state = LinkState::Disconnected;
        }

        info!("Recognition stream closed");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ws_sender.is_some()
    }

    async fn send_audio(&mut self, audio: Vec<u8>) -> Result<(), RecognitionError> {
        let ws_sender = self.ws_sender.as_ref().ok_or_else(|| {
            RecognitionError::ConnectionFailed("Not connected to provider".to_string())
        })?;

        let len = audio.len();
        ws_sender
            .send(Message::Binary(audio.into()))
            .map_err(|e| RecognitionError::NetworkError(format!("Failed to send audio: {e}")))?;
        debug!("Sent {} bytes of audio", len);
        Ok(())
    }

    fn on_event(&self, callback: RecognitionCallback) {
        *self.event_callback.write() = Some(callback);
    }

    fn on_error(&self, callback: RecognitionErrorCallback) {
        *self.error_callback.write() = Some(callback);
    }
}

impl Drop for DeepgramRecognizer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn url_carries_live_options() {
        let config = RecognizerConfig {
            api_key: "test_key".to_string(),
            ..Default::default()
        };
        let url = listen_url(&config).unwrap();
        assert!(url.starts_with("wss://api.deepgram.com/v1/listen"));
        assert!(url.contains("model=nova-2"));
        assert!(url.contains("language=multi"));
        assert!(url.contains("smart_format=true"));
        assert!(url.contains("interim_results=true"));
        assert!(url.contains("vad_events=true"));
        assert!(url.contains("utterance_end_ms=1000"));
        assert!(url.contains("endpointing=200"));
        // No raw-audio parameters unless configured.
        assert!(!url.contains("encoding="));
        assert!(!url.contains("sample_rate="));
    }

    #[test]
    fn url_includes_raw_audio_parameters_when_set() {
        let config = RecognizerConfig {
            api_key: "test_key".to_string(),
            encoding: Some("linear16".to_string()),
            sample_rate: Some(16000),
            channels: Some(1),
            ..Default::default()
        };
        let url = listen_url(&config).unwrap();
        assert!(url.contains("encoding=linear16"));
        assert!(url.contains("sample_rate=16000"));
        assert!(url.contains("channels=1"));
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let result = <DeepgramRecognizer as BaseRecognizer>::new(RecognizerConfig::default());
        assert!(matches!(
            result,
            Err(RecognitionError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn interim_results_map_to_interim_events() {
        let response: ListenResponse = serde_json::from_str(
            r#"{
                "type": "Results",
                "channel": { "alternatives": [ { "transcript": "hola", "confidence": 0.91 } ] },
                "is_final": false,
                "speech_final": false
            }"#,
        )
        .unwrap();

        assert_eq!(
            recognition_event(&response),
            Some(RecognitionEvent::Interim {
                text: "hola".to_string()
            })
        );
    }

    #[test]
    fn final_results_carry_the_boundary_flag() {
        let response: ListenResponse = serde_json::from_str(
            r#"{
                "type": "Results",
                "channel": { "alternatives": [ { "transcript": "como estas", "confidence": 0.97 } ] },
                "is_final": true,
                "speech_final": true
            }"#,
        )
        .unwrap();

        assert_eq!(
            recognition_event(&response),
            Some(RecognitionEvent::Final {
                text: "como estas".to_string(),
                is_end_of_speech: true
            })
        );
    }

    #[test]
    fn utterance_end_maps_to_boundary_marker() {
        let response: ListenResponse =
            serde_json::from_str(r#"{ "type": "UtteranceEnd" }"#).unwrap();
        assert_eq!(
            recognition_event(&response),
            Some(RecognitionEvent::Final {
                text: String::new(),
                is_end_of_speech: true
            })
        );
    }

    #[test]
    fn speech_started_maps_to_onset_event() {
        let response: ListenResponse =
            serde_json::from_str(r#"{ "type": "SpeechStarted" }"#).unwrap();
        assert_eq!(
            recognition_event(&response),
            Some(RecognitionEvent::SpeechStarted)
        );
    }

    #[test]
    fn unknown_response_types_map_to_nothing() {
        let response: ListenResponse = serde_json::from_str(r#"{ "type": "Metadata" }"#).unwrap();
        assert_eq!(recognition_event(&response), None);
    }

    #[tokio::test]
    async fn malformed_payload_hits_error_callback_not_event_callback() {
        let event_slot: Arc<SyncRwLock<Option<RecognitionCallback>>> =
            Arc::new(SyncRwLock::new(None));
        let error_slot: Arc<SyncRwLock<Option<RecognitionErrorCallback>>> =
            Arc::new(SyncRwLock::new(None));

        let events = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));

        let events_clone = events.clone();
        let event_callback: RecognitionCallback = Arc::new(move |_event| {
            let events = events_clone.clone();
            Box::pin(async move {
                events.fetch_add(1, Ordering::SeqCst);
            })
        });
        *event_slot.write() = Some(event_callback);
        let errors_clone = errors.clone();
        let error_callback: RecognitionErrorCallback = Arc::new(move |error| {
            let errors = errors_clone.clone();
            Box::pin(async move {
                assert!(matches!(error, RecognitionError::MalformedEvent(_)));
                errors.fetch_add(1, Ordering::SeqCst);
            })
        });
        *error_slot.write() = Some(error_callback);

        handle_provider_message(
            Message::Text("{not json".to_string().into()),
            &event_slot,
            &error_slot,
        )
        .await;

        assert_eq!(events.load(Ordering::SeqCst), 0);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn results_payload_reaches_event_callback() {
        let event_slot: Arc<SyncRwLock<Option<RecognitionCallback>>> =
            Arc::new(SyncRwLock::new(None));
        let error_slot: Arc<SyncRwLock<Option<RecognitionErrorCallback>>> =
            Arc::new(SyncRwLock::new(None));

        let events = Arc::new(AtomicUsize::new(0));
        let events_clone = events.clone();
        let event_callback: RecognitionCallback = Arc::new(move |event| {
            let events = events_clone.clone();
            Box::pin(async move {
                assert_eq!(
                    event,
                    RecognitionEvent::Final {
                        text: "hola".to_string(),
                        is_end_of_speech: false
                    }
                );
                events.fetch_add(1, Ordering::SeqCst);
            })
        });
        *event_slot.write() = Some(event_callback);

        let payload = r#"{
            "type": "Results",
            "channel": { "alternatives": [ { "transcript": "hola", "confidence": 0.9 } ] },
            "is_final": true,
            "speech_final": false
        }"#;
        handle_provider_message(
            Message::Text(payload.to_string().into()),
            &event_slot,
            &error_slot,
        )
        .await;

        assert_eq!(events.load(Ordering::SeqCst), 1);
    }
}
