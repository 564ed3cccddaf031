//! Speaking-turn tracking and interruption gating.
//!
//! # State Transitions
//!
//! ```text
//! [Idle] ─── speaking-started ──► [AgentSpeaking]
//!    ▲                                  │
//!    └────── speaking-stopped ──────────┘
//! ```
//!
//! Entering either state re-arms the interrupt latch, so each AgentSpeaking
//! period grants at most one interruption no matter how many overlapping
//! speech events arrive during it.

use tracing::debug;

/// Whether the agent is currently rendering speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Nobody is speaking on the agent's behalf.
    Idle,
    /// The avatar is rendering an agent turn.
    AgentSpeaking,
}

/// Tracks the agent's speaking state and gates interruption requests.
///
/// Transitions happen only on synthesis start/stop signals. A real provider
/// emits several interim transcripts for one burst of overlapping user
/// speech; the latch here is the sole guard that collapses those into a
/// single external interrupt call.
#[derive(Debug)]
pub struct TurnTracker {
    state: TurnState,
    interrupted_this_turn: bool,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self {
            state: TurnState::Idle,
            interrupted_this_turn: false,
        }
    }

    /// The avatar started rendering an agent turn.
    pub fn on_speaking_started(&mut self) {
        debug!("turn: agent speaking");
        self.state = TurnState::AgentSpeaking;
        self.interrupted_this_turn = false;
    }

    /// The avatar finished (or was cut off from) rendering an agent turn.
    ///
    /// Also clears the interrupt latch so a stale latch can never suppress
    /// interruption at the next speaking period.
    pub fn on_speaking_stopped(&mut self) {
        debug!("turn: agent idle");
        self.state = TurnState::Idle;
        self.interrupted_this_turn = false;
    }

    /// Ask to interrupt the agent because user speech was detected.
    ///
    /// Returns `true` exactly once per AgentSpeaking period; the caller is
    /// then responsible for invoking the external interrupt operation.
    /// A no-op while idle or once the current turn was already interrupted.
    pub fn request_interrupt(&mut self) -> bool {
        if self.state != TurnState::AgentSpeaking || self.interrupted_this_turn {
            return false;
        }
        self.interrupted_this_turn = true;
        true
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn is_agent_speaking(&self) -> bool {
        self.state == TurnState::AgentSpeaking
    }
}

impl Default for TurnTracker {
    fn default() -> Self {
        Self::new()
    }
}
