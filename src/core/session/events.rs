//! Event and notification types for the session loop.

use crate::core::generation::GenerationError;
use crate::core::recognition::RecognitionEvent;

/// Everything a call session reacts to, delivered through one FIFO queue so
/// handlers run strictly sequentially per session.
#[derive(Debug)]
pub enum SessionEvent {
    /// A transcript event from the recognition stream.
    Recognition(RecognitionEvent),
    /// The avatar started rendering agent speech.
    SpeakingStarted,
    /// The avatar finished rendering agent speech.
    SpeakingStopped,
    /// One text delta of the in-flight reply.
    ReplyDelta(String),
    /// The reply stream closed normally.
    ReplyClosed,
    /// The reply request failed; the turn is dropped.
    ReplyFailed(GenerationError),
    /// End the session: cancel timers, discard in-flight work, stop the
    /// avatar session.
    Shutdown,
}

/// Notifications the session emits for the serving layer to forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// A finalized user utterance entered the conversation.
    UserUtterance { text: String },
    /// An assembled agent reply is being spoken.
    AgentReply { text: String },
}
