//! Streaming reply generation.
//!
//! The provider is consumed as a request carrying the ordered conversation
//! history, answered by a stream of text deltas terminated by stream close.

pub mod base;
pub mod openai;

pub use base::{ChatMessage, GenerationConfig, GenerationError, ReplyClient, Role};
pub use openai::OpenAiChat;
