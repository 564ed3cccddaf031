//! Call socket error types.

use thiserror::Error;

/// Errors reported to the client over the call socket.
#[derive(Debug, Error)]
pub enum CallSocketError {
    /// A call is already wired up on this connection
    #[error("Call already started on this connection")]
    CallAlreadyStarted,

    /// Audio or a control message arrived before `start`
    #[error("No call in progress. Send a start message first.")]
    CallNotStarted,

    /// A required provider key is missing from the server configuration
    #[error("{0} is not configured on the server")]
    ProviderNotConfigured(&'static str),

    /// The recognition stream could not be opened
    #[error("Failed to open recognition stream: {0}")]
    RecognitionConnect(String),

    /// A provider client could not be constructed
    #[error("Failed to initialize {provider} client: {error}")]
    ProviderSetup {
        provider: &'static str,
        error: String,
    },

    /// Failed to forward audio to the recognition stream
    #[error("Failed to process audio: {0}")]
    AudioProcessing(String),
}

/// Result type for call socket operations.
pub type CallSocketResult<T> = Result<T, CallSocketError>;
