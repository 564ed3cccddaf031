//! Bounded conversation history.

use std::collections::VecDeque;

use crate::core::generation::{ChatMessage, Role};

/// Ordered role-tagged conversation history with FIFO eviction.
///
/// The cap bounds what is replayed to the generation provider on every
/// request; the oldest entries fall off first. The system prompt is not
/// stored here; the generation client prepends it per request.
#[derive(Debug)]
pub struct ChatHistory {
    messages: VecDeque<ChatMessage>,
    limit: usize,
}

impl ChatHistory {
    /// Create a history bounded to `limit` entries. A zero limit is clamped
    /// to one so a push can never fail.
    pub fn new(limit: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(limit.max(1)),
            limit: limit.max(1),
        }
    }

    /// Append a message, evicting the oldest entry once the cap is reached.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        if self.messages.len() == self.limit {
            self.messages.pop_front();
        }
        self.messages.push_back(ChatMessage {
            role,
            content: content.into(),
        });
    }

    /// Ordered copy of the current history for a generation request.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
