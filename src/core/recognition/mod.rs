//! Streaming speech recognition.
//!
//! The provider is consumed as a bidirectional WebSocket: audio frames go
//! up, transcript events come down. [`RecognitionEvent`] is the normalized
//! event shape the rest of the system sees.

pub mod base;
pub mod deepgram;

pub use base::{
    BaseRecognizer, LinkState, RecognitionCallback, RecognitionError, RecognitionErrorCallback,
    RecognitionEvent, RecognizerConfig,
};
pub use deepgram::{
    listen_url, open_provider_socket, DeepgramRecognizer, ProviderSocket, KEEPALIVE_FRAME,
};
