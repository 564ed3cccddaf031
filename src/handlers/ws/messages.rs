//! Call socket message types.

use serde::{Deserialize, Serialize};

use crate::core::recognition::RecognitionEvent;

/// Messages the client sends over the call socket.
///
/// Binary frames (microphone audio) arrive outside this enum.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    /// Begin the call: open the recognition stream and wire the session to
    /// the avatar streaming session the client already holds.
    #[serde(rename = "start")]
    Start {
        /// Identifier of the client's open avatar streaming session.
        avatar_session_id: String,
        /// Per-call system prompt override.
        #[serde(skip_serializing_if = "Option::is_none")]
        system_prompt: Option<String>,
        /// Per-call recognition language override.
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    /// The avatar renderer reported that agent speech started.
    #[serde(rename = "speaking_started")]
    SpeakingStarted,
    /// The avatar renderer reported that agent speech stopped.
    #[serde(rename = "speaking_stopped")]
    SpeakingStopped,
    /// End the call and release provider connections.
    #[serde(rename = "end")]
    End,
}

/// Messages the server sends over the call socket.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    /// The call is wired up; audio may flow.
    #[serde(rename = "ready")]
    Ready,
    /// A transcript event, forwarded as it arrives.
    #[serde(rename = "transcript")]
    Transcript {
        text: String,
        is_final: bool,
        is_end_of_speech: bool,
    },
    /// A finalized user utterance entered the conversation.
    #[serde(rename = "utterance")]
    Utterance { text: String },
    /// An assembled agent reply is being spoken.
    #[serde(rename = "reply")]
    Reply { text: String },
    /// The call ended.
    #[serde(rename = "ended")]
    Ended,
    /// Something went wrong; the connection stays usable unless noted.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Transcript notification for a recognition event, when one applies.
///
/// Speech-onset events carry no text and are not forwarded.
pub fn transcript_message(event: &RecognitionEvent) -> Option<OutgoingMessage> {
    match event {
        RecognitionEvent::SpeechStarted => None,
        RecognitionEvent::Interim { text } => Some(OutgoingMessage::Transcript {
            text: text.clone(),
            is_final: false,
            is_end_of_speech: false,
        }),
        RecognitionEvent::Final {
            text,
            is_end_of_speech,
        } => Some(OutgoingMessage::Transcript {
            text: text.clone(),
            is_final: true,
            is_end_of_speech: *is_end_of_speech,
        }),
    }
}
