//! Timing and sizing configuration for a call session.

use std::time::Duration;

/// Tunable knobs for the session event loop.
///
/// The defaults were tuned against one provider's event timing and are
/// deliberately configurable rather than load-bearing constants; tests
/// shrink them to keep timer-dependent paths fast.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Quiet period after the last finalized segment before the pending
    /// utterance is force-flushed. Fallback for providers that never send
    /// the end-of-speech boundary. Default: 2000 ms.
    pub utterance_flush: Duration,
    /// Inactivity window after the last reply delta before the accumulated
    /// reply is considered complete and spoken. Default: 350 ms.
    pub reply_settle: Duration,
    /// Maximum retained conversation history entries; oldest evicted first.
    /// Default: 20.
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            utterance_flush: Duration::from_millis(2000),
            reply_settle: Duration::from_millis(350),
            history_limit: 20,
        }
    }
}

impl SessionConfig {
    /// Override the forced-finalization quiet period.
    pub fn with_utterance_flush(mut self, window: Duration) -> Self {
        self.utterance_flush = window;
        self
    }

    /// Override the reply inactivity window.
    pub fn with_reply_settle(mut self, window: Duration) -> Self {
        self.reply_settle = window;
        self
    }

    /// Override the conversation history cap.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}
