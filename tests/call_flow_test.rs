//! Integration tests for the call session event loop.
//!
//! These drive a full session against mock avatar and generation providers:
//! utterance finalization, forced flush, interruption gating, reply
//! assembly, queued turns, and failure tolerance. Timing windows are shrunk
//! so the timer-dependent paths run in milliseconds.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use charla::core::avatar::{AvatarControl, AvatarError};
use charla::core::generation::{ChatMessage, GenerationError, ReplyClient};
use charla::core::recognition::RecognitionEvent;
use charla::core::session::{CallSession, SessionConfig, SessionEvent, SessionUpdate};

/// Records every control operation invoked on the avatar.
#[derive(Default)]
struct RecordingAvatar {
    speaks: Mutex<Vec<String>>,
    interrupts: AtomicUsize,
    stops: AtomicUsize,
}

#[async_trait::async_trait]
impl AvatarControl for RecordingAvatar {
    async fn speak(&self, text: &str) -> Result<(), AvatarError> {
        self.speaks.lock().push(text.to_string());
        Ok(())
    }

    async fn interrupt(&self) -> Result<(), AvatarError> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AvatarError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One scripted outcome for a reply request.
enum Script {
    Deltas(Vec<&'static str>),
    Fail,
}

/// Plays back scripted reply streams, one script per request, and records
/// the history each request carried.
struct ScriptedReplies {
    scripts: Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
    histories: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedReplies {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            calls: AtomicUsize::new(0),
            histories: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl ReplyClient for ScriptedReplies {
    async fn stream_reply(
        &self,
        history: Vec<ChatMessage>,
        deltas: mpsc::Sender<String>,
    ) -> Result<(), GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.histories.lock().push(history);

        let script = self.scripts.lock().pop_front();
        match script {
            Some(Script::Deltas(parts)) => {
                for part in parts {
                    if deltas.send(part.to_string()).await.is_err() {
                        return Ok(());
                    }
                    sleep(Duration::from_millis(5)).await;
                }
                Ok(())
            }
            Some(Script::Fail) => Err(GenerationError::RequestFailed("scripted failure".into())),
            None => Ok(()),
        }
    }
}

struct Harness {
    events: mpsc::Sender<SessionEvent>,
    updates: mpsc::Receiver<SessionUpdate>,
    avatar: Arc<RecordingAvatar>,
    replies: Arc<ScriptedReplies>,
    task: JoinHandle<()>,
}

/// Spin up a session with fast timers and the given reply scripts.
fn start_session(scripts: Vec<Script>) -> Harness {
    let config = SessionConfig::default()
        .with_utterance_flush(Duration::from_millis(80))
        .with_reply_settle(Duration::from_millis(40))
        .with_history_limit(20);

    let avatar = Arc::new(RecordingAvatar::default());
    let replies = Arc::new(ScriptedReplies::new(scripts));
    let (events_tx, events_rx) = mpsc::channel(64);
    let (updates_tx, updates_rx) = mpsc::channel(64);

    let session = CallSession::new(
        config,
        avatar.clone(),
        replies.clone(),
        events_tx.clone(),
        updates_tx,
    );
    let task = tokio::spawn(session.run(events_rx));

    Harness {
        events: events_tx,
        updates: updates_rx,
        avatar,
        replies,
        task,
    }
}

impl Harness {
    async fn recognize(&self, event: RecognitionEvent) {
        self.events
            .send(SessionEvent::Recognition(event))
            .await
            .expect("session alive");
    }

    async fn shutdown(self) -> Arc<RecordingAvatar> {
        let _ = self.events.send(SessionEvent::Shutdown).await;
        let _ = self.task.await;
        self.avatar
    }
}

fn final_seg(text: &str, is_end_of_speech: bool) -> RecognitionEvent {
    RecognitionEvent::Final {
        text: text.to_string(),
        is_end_of_speech,
    }
}

fn interim(text: &str) -> RecognitionEvent {
    RecognitionEvent::Interim {
        text: text.to_string(),
    }
}

#[tokio::test]
async fn utterance_flows_through_generation_to_avatar_speech() {
    let mut harness = start_session(vec![Script::Deltas(vec!["Hola", " mundo"])]);

    harness.recognize(final_seg("hola", false)).await;
    harness.recognize(final_seg("como estas", true)).await;

    // Deltas arrive 5 ms apart, then the 40 ms settle window closes the turn.
    sleep(Duration::from_millis(250)).await;

    assert_eq!(
        harness.updates.recv().await,
        Some(SessionUpdate::UserUtterance {
            text: "hola como estas ".to_string()
        })
    );
    assert_eq!(
        harness.updates.recv().await,
        Some(SessionUpdate::AgentReply {
            text: "Hola mundo".to_string()
        })
    );

    assert_eq!(harness.replies.calls.load(Ordering::SeqCst), 1);
    let avatar = harness.shutdown().await;
    assert_eq!(*avatar.speaks.lock(), vec!["Hola mundo".to_string()]);
    assert_eq!(avatar.interrupts.load(Ordering::SeqCst), 0);
    assert_eq!(avatar.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn quiet_period_forces_utterance_flush() {
    let harness = start_session(vec![Script::Deltas(vec!["Claro"])]);

    // No end-of-speech boundary ever arrives; the 80 ms flush window must
    // finalize the turn on its own.
    harness.recognize(final_seg("hola", false)).await;
    sleep(Duration::from_millis(250)).await;

    assert_eq!(harness.replies.calls.load(Ordering::SeqCst), 1);
    let histories = harness.replies.histories.lock();
    assert_eq!(histories[0].last().unwrap().content, "hola ");
    drop(histories);

    let avatar = harness.shutdown().await;
    assert_eq!(*avatar.speaks.lock(), vec!["Claro".to_string()]);
}

#[tokio::test]
async fn overlapping_speech_interrupts_exactly_once_per_turn() {
    let harness = start_session(vec![]);

    harness.events.send(SessionEvent::SpeakingStarted).await.unwrap();
    harness.recognize(interim("espera")).await;
    harness.recognize(interim("espera espera")).await;
    harness.recognize(final_seg("espera", false)).await;
    sleep(Duration::from_millis(20)).await;

    assert_eq!(harness.avatar.interrupts.load(Ordering::SeqCst), 1);

    // A fresh speaking period re-arms the gate.
    harness.events.send(SessionEvent::SpeakingStopped).await.unwrap();
    harness.events.send(SessionEvent::SpeakingStarted).await.unwrap();
    harness.recognize(interim("otra vez")).await;
    sleep(Duration::from_millis(20)).await;

    assert_eq!(harness.avatar.interrupts.load(Ordering::SeqCst), 2);
    harness.shutdown().await;
}

#[tokio::test]
async fn idle_agent_is_never_interrupted() {
    let harness = start_session(vec![Script::Deltas(vec!["Bien"])]);

    harness.recognize(final_seg("hola", false)).await;
    harness.recognize(final_seg("como estas", true)).await;
    sleep(Duration::from_millis(200)).await;

    let avatar = harness.shutdown().await;
    assert_eq!(avatar.interrupts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_utterance_waits_for_prior_reply_cycle() {
    let mut harness = start_session(vec![
        Script::Deltas(vec!["Primera", " respuesta"]),
        Script::Deltas(vec!["Segunda"]),
    ]);

    harness.recognize(final_seg("primera pregunta", true)).await;
    // Second utterance lands while the first reply is still streaming.
    sleep(Duration::from_millis(5)).await;
    harness.recognize(final_seg("segunda pregunta", true)).await;

    sleep(Duration::from_millis(400)).await;

    assert_eq!(harness.replies.calls.load(Ordering::SeqCst), 2);

    // Updates arrive in conversation order: both utterances were accepted
    // immediately, the replies strictly one after the other.
    let mut updates = Vec::new();
    while let Ok(update) = harness.updates.try_recv() {
        updates.push(update);
    }
    let replies: Vec<_> = updates
        .iter()
        .filter_map(|u| match u {
            SessionUpdate::AgentReply { text } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(replies, vec!["Primera respuesta", "Segunda"]);

    // The queued request saw both user turns and the first assistant turn.
    let histories = harness.replies.histories.lock();
    assert_eq!(histories[0].len(), 1);
    assert_eq!(histories[1].len(), 3);
    drop(histories);

    let avatar = harness.shutdown().await;
    assert_eq!(
        *avatar.speaks.lock(),
        vec!["Primera respuesta".to_string(), "Segunda".to_string()]
    );
}

#[tokio::test]
async fn failed_generation_drops_turn_but_keeps_session() {
    let harness = start_session(vec![Script::Fail, Script::Deltas(vec!["Ahora si"])]);

    harness.recognize(final_seg("primera", true)).await;
    sleep(Duration::from_millis(120)).await;

    // First turn died silently; nothing was spoken.
    assert!(harness.avatar.speaks.lock().is_empty());

    harness.recognize(final_seg("segunda", true)).await;
    sleep(Duration::from_millis(200)).await;

    assert_eq!(harness.replies.calls.load(Ordering::SeqCst), 2);
    let avatar = harness.shutdown().await;
    assert_eq!(*avatar.speaks.lock(), vec!["Ahora si".to_string()]);
}

#[tokio::test]
async fn agent_turn_start_resets_pending_transcript() {
    let harness = start_session(vec![]);

    // Buffered speech with no boundary, then the agent starts talking: the
    // accumulator resets and the flush timer never fires.
    harness.recognize(final_seg("a medias", false)).await;
    harness.events.send(SessionEvent::SpeakingStarted).await.unwrap();
    sleep(Duration::from_millis(200)).await;

    assert_eq!(harness.replies.calls.load(Ordering::SeqCst), 0);
    harness.shutdown().await;
}

#[tokio::test]
async fn whitespace_only_reply_is_never_spoken() {
    let harness = start_session(vec![Script::Deltas(vec!["  ", "\n"])]);

    harness.recognize(final_seg("hola", true)).await;
    sleep(Duration::from_millis(200)).await;

    let avatar = harness.shutdown().await;
    assert!(avatar.speaks.lock().is_empty());
}

#[tokio::test]
async fn shutdown_stops_avatar_session() {
    let harness = start_session(vec![]);
    let avatar = harness.shutdown().await;
    assert_eq!(avatar.stops.load(Ordering::SeqCst), 1);
}
