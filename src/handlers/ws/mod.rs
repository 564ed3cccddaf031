//! # Call Socket Handler
//!
//! WebSocket interface for running a voice call against the avatar.
//!
//! ## Connection Flow
//! 1. Client opens its avatar streaming session via the browser SDK (token
//!    minted through `POST /token`) and connects to `/ws`.
//! 2. Client sends a `start` message carrying the avatar session id; the
//!    server opens the recognition stream, wires the generation client, and
//!    answers `ready`.
//! 3. Client streams microphone audio as binary frames and relays the
//!    avatar renderer's speaking-state events as `speaking_started` /
//!    `speaking_stopped` messages.
//! 4. Server pushes `transcript` notifications as recognition events arrive,
//!    an `utterance` once a user turn finalizes, and a `reply` when an
//!    assembled agent reply is sent to the avatar.
//! 5. `end` (or closing the socket) tears the call down.
//!
//! ## Message Types
//!
//! **Incoming:**
//! - `{"type": "start", "avatar_session_id": "...", "system_prompt": "...", "language": "es"}`
//! - `{"type": "speaking_started"}` / `{"type": "speaking_stopped"}`
//! - `{"type": "end"}`
//! - **Binary frames**: microphone audio for transcription
//!
//! **Outgoing:**
//! - `{"type": "ready"}`
//! - `{"type": "transcript", "text": "...", "is_final": true, "is_end_of_speech": false}`
//! - `{"type": "utterance", "text": "..."}`
//! - `{"type": "reply", "text": "..."}`
//! - `{"type": "ended"}`
//! - `{"type": "error", "message": "..."}`

pub mod error;
pub mod handler;
pub mod messages;
pub mod processor;
pub mod state;


// Re-export commonly used items
pub use error::{CallSocketError, CallSocketResult};
pub use handler::call_handler;
pub use messages::{IncomingMessage, OutgoingMessage};
pub use state::ConnectionState;
