/// Error types for avatar session operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AvatarError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Control operations on one live avatar streaming session.
///
/// The session's speaking-started / speaking-stopped signals arrive
/// separately, from wherever the avatar stream is rendered.
#[async_trait::async_trait]
pub trait AvatarControl: Send + Sync {
    /// Have the avatar speak the given text.
    async fn speak(&self, text: &str) -> Result<(), AvatarError>;

    /// Cut off the avatar's in-progress speech.
    async fn interrupt(&self) -> Result<(), AvatarError>;

    /// End the streaming session.
    async fn stop(&self) -> Result<(), AvatarError>;
}
