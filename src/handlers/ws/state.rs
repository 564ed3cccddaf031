//! Call socket connection state.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::core::recognition::DeepgramRecognizer;
use crate::core::session::SessionEvent;

/// Per-connection state for one call socket.
///
/// Populated by the `start` message and torn down when the call ends or the
/// socket closes. The `call_active` flag is atomic so the audio hot path
/// checks it without taking the state lock for writing.
pub struct ConnectionState {
    /// Recognition stream for this call.
    pub recognizer: Option<Arc<RwLock<DeepgramRecognizer>>>,
    /// Event queue into the call session.
    pub session_events: Option<mpsc::Sender<SessionEvent>>,
    /// The running session task.
    pub session_task: Option<JoinHandle<()>>,
    /// Task forwarding session updates to the client.
    pub updates_task: Option<JoinHandle<()>>,
    /// Unique identifier for this connection.
    pub stream_id: Option<String>,
    /// Whether a call is currently wired up.
    pub call_active: AtomicBool,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            recognizer: None,
            session_events: None,
            session_task: None,
            updates_task: None,
            stream_id: None,
            call_active: AtomicBool::new(false),
        }
    }

    pub fn is_call_active(&self) -> bool {
        self.call_active.load(Ordering::Relaxed)
    }

    pub fn set_call_active(&self, active: bool) {
        self.call_active.store(active, Ordering::Relaxed);
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
