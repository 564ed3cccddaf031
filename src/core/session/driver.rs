//! The call session event loop.
//!
//! One [`CallSession`] runs as a single tokio task consuming a FIFO event
//! queue, so recognition events, reply deltas, speaking signals, and timer
//! expiries are handled strictly sequentially with no shared-memory races.
//! Provider calls that must not block the loop (reply streaming) run in a
//! spawned task that feeds results back through the same queue.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::avatar::AvatarControl;
use crate::core::generation::{ReplyClient, Role};
use crate::core::recognition::RecognitionEvent;

use super::{
    aggregator::{FlushTimer, TranscriptAggregator},
    assembler::ReplyAssembler,
    config::SessionConfig,
    events::{SessionEvent, SessionUpdate},
    history::ChatHistory,
    turn::TurnTracker,
};

/// Queue depth for reply deltas between the streaming task and the loop.
const REPLY_DELTA_BUFFER: usize = 64;

/// Drives one call: transcript aggregation, turn tracking, reply assembly,
/// and avatar control, composed over a single event queue.
///
/// Constructed with the session's own instances of every sub-component; no
/// state is shared across sessions. Dropping the event sender (or sending
/// [`SessionEvent::Shutdown`]) ends the loop, which aborts any in-flight
/// reply task and stops the avatar session.
pub struct CallSession {
    config: SessionConfig,
    avatar: Arc<dyn AvatarControl>,
    replies: Arc<dyn ReplyClient>,

    aggregator: TranscriptAggregator,
    assembler: ReplyAssembler,
    turn: TurnTracker,
    history: ChatHistory,

    /// Loop-back sender so spawned reply tasks feed the same queue.
    events_tx: mpsc::Sender<SessionEvent>,
    /// Notifications for the serving layer.
    updates_tx: mpsc::Sender<SessionUpdate>,

    /// Deadline of the armed forced-finalization timer, if any.
    flush_deadline: Option<Instant>,
    /// Deadline of the armed reply inactivity timer, if any.
    settle_deadline: Option<Instant>,

    /// One outstanding generation request at a time.
    reply_in_flight: bool,
    /// The in-flight reply stream has not closed yet.
    reply_stream_open: bool,
    /// User turns that arrived while a reply was in flight.
    queued_turns: VecDeque<String>,
    reply_task: Option<JoinHandle<()>>,
}

impl CallSession {
    pub fn new(
        config: SessionConfig,
        avatar: Arc<dyn AvatarControl>,
        replies: Arc<dyn ReplyClient>,
        events_tx: mpsc::Sender<SessionEvent>,
        updates_tx: mpsc::Sender<SessionUpdate>,
    ) -> Self {
        Self {
            history: ChatHistory::new(config.history_limit),
            config,
            avatar,
            replies,
            aggregator: TranscriptAggregator::new(),
            assembler: ReplyAssembler::new(),
            turn: TurnTracker::new(),
            events_tx,
            updates_tx,
            flush_deadline: None,
            settle_deadline: None,
            reply_in_flight: false,
            reply_stream_open: false,
            queued_turns: VecDeque::new(),
            reply_task: None,
        }
    }

    /// Run the session until shutdown, consuming events from `events`.
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) {
        info!("call session started");
        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    match maybe_event {
                        Some(event) => {
                            if !self.handle_event(event).await {
                                break;
                            }
                        }
                        // All senders gone: the connection is dead.
                        None => break,
                    }
                }
                _ = sleep_until_opt(self.flush_deadline), if self.flush_deadline.is_some() => {
                    self.flush_deadline = None;
                    self.flush_pending_utterance().await;
                }
                _ = sleep_until_opt(self.settle_deadline), if self.settle_deadline.is_some() => {
                    self.settle_deadline = None;
                    self.settle_reply().await;
                }
            }
        }
        self.teardown().await;
        info!("call session ended");
    }

    /// Handle one event; returns false when the session should end.
    async fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Recognition(recognition) => {
                self.on_recognition(recognition).await;
            }
            SessionEvent::SpeakingStarted => {
                self.turn.on_speaking_started();
                // The agent opening a turn resets the user accumulator.
                self.aggregator.reset();
                self.flush_deadline = None;
            }
            SessionEvent::SpeakingStopped => {
                self.turn.on_speaking_stopped();
            }
            SessionEvent::ReplyDelta(delta) => {
                self.assembler.push(&delta);
                self.settle_deadline = Some(Instant::now() + self.config.reply_settle);
            }
            SessionEvent::ReplyClosed => {
                self.reply_stream_open = false;
                self.maybe_finish_reply_cycle();
            }
            SessionEvent::ReplyFailed(error) => {
                warn!(error = %error, "reply generation failed, dropping turn");
                self.assembler.clear();
                self.settle_deadline = None;
                self.reply_stream_open = false;
                self.maybe_finish_reply_cycle();
            }
            SessionEvent::Shutdown => return false,
        }
        true
    }

    async fn on_recognition(&mut self, event: RecognitionEvent) {
        let outcome = self.aggregator.on_event(&event);

        if outcome.voiced && self.turn.request_interrupt() {
            debug!("user speech overlaps agent turn, interrupting avatar");
            if let Err(error) = self.avatar.interrupt().await {
                warn!(error = %error, "avatar interrupt failed");
            }
        }

        match outcome.flush_timer {
            FlushTimer::Unchanged => {}
            FlushTimer::Cancel => self.flush_deadline = None,
            FlushTimer::Restart => {
                self.flush_deadline = Some(Instant::now() + self.config.utterance_flush);
            }
        }

        if let Some(utterance) = outcome.utterance {
            self.take_user_turn(utterance).await;
        }
    }

    /// Forced finalization when the provider never closed the utterance.
    async fn flush_pending_utterance(&mut self) {
        if let Some(utterance) = self.aggregator.force_flush() {
            self.take_user_turn(utterance).await;
        }
    }

    async fn take_user_turn(&mut self, text: String) {
        info!(chars = text.len(), "user utterance finalized");
        let _ = self
            .updates_tx
            .send(SessionUpdate::UserUtterance { text: text.clone() })
            .await;
        self.history.push(Role::User, text.clone());

        if self.reply_in_flight {
            debug!("reply in flight, queueing user turn");
            self.queued_turns.push_back(text);
        } else {
            self.request_reply();
        }
    }

    /// Issue one generation request carrying the full history. Deltas and
    /// the terminal outcome come back through the session event queue, so
    /// ordering against other events stays FIFO.
    fn request_reply(&mut self) {
        self.reply_in_flight = true;
        self.reply_stream_open = true;

        let history = self.history.snapshot();
        let client = self.replies.clone();
        let events = self.events_tx.clone();
        let (delta_tx, mut delta_rx) = mpsc::channel::<String>(REPLY_DELTA_BUFFER);

        self.reply_task = Some(tokio::spawn(async move {
            let forward = async {
                while let Some(delta) = delta_rx.recv().await {
                    if events.send(SessionEvent::ReplyDelta(delta)).await.is_err() {
                        break;
                    }
                }
            };
            let request = client.stream_reply(history, delta_tx);
            let (result, ()) = tokio::join!(request, forward);

            let terminal = match result {
                Ok(()) => SessionEvent::ReplyClosed,
                Err(error) => SessionEvent::ReplyFailed(error),
            };
            let _ = events.send(terminal).await;
        }));
    }

    /// Settle-timer expiry: speak the assembled reply, if any.
    async fn settle_reply(&mut self) {
        if let Some(text) = self.assembler.settle() {
            info!(chars = text.len(), "agent reply assembled");
            self.history.push(Role::Assistant, text.clone());
            let _ = self
                .updates_tx
                .send(SessionUpdate::AgentReply { text: text.clone() })
                .await;
            if let Err(error) = self.avatar.speak(&text).await {
                warn!(error = %error, "avatar speak failed, dropping turn");
            }
        }
        self.maybe_finish_reply_cycle();
    }

    /// A reply cycle completes once the stream closed and the assembler
    /// drained. Only then may a queued user turn issue the next request,
    /// which keeps at most one generation request outstanding and assistant
    /// turns in order.
    fn maybe_finish_reply_cycle(&mut self) {
        let drained = self.settle_deadline.is_none() && self.assembler.is_empty();
        if self.reply_in_flight && !self.reply_stream_open && drained {
            self.reply_in_flight = false;
            self.reply_task = None;
            if let Some(next) = self.queued_turns.pop_front() {
                debug!(chars = next.len(), "issuing queued user turn");
                self.request_reply();
            }
        }
    }

    /// Cancel timers, discard in-flight work, stop the avatar session.
    async fn teardown(&mut self) {
        self.flush_deadline = None;
        self.settle_deadline = None;
        if let Some(task) = self.reply_task.take() {
            task.abort();
        }
        if let Err(error) = self.avatar.stop().await {
            debug!(error = %error, "avatar stop on teardown failed");
        }
    }
}

/// Sleep until an armed deadline; pends forever when unarmed. Always used
/// behind an `is_some()` select guard, so the unarmed branch never wins.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
