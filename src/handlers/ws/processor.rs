//! Call socket message routing and call setup.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

use crate::core::avatar::AvatarControl;
use crate::core::generation::{OpenAiChat, ReplyClient};
use crate::core::recognition::{
    BaseRecognizer, DeepgramRecognizer, RecognitionCallback, RecognitionErrorCallback,
};
use crate::core::session::{CallSession, SessionEvent, SessionUpdate};
use crate::state::AppState;

use super::{
    error::CallSocketError,
    messages::{transcript_message, IncomingMessage, OutgoingMessage},
    state::ConnectionState,
};

/// Queue depth for session events and updates.
const SESSION_CHANNEL_SIZE: usize = 256;

/// Route one parsed incoming message.
///
/// # Returns
/// * `bool` - true to continue processing, false to terminate the connection
pub async fn handle_incoming_message(
    msg: IncomingMessage,
    state: &Arc<RwLock<ConnectionState>>,
    message_tx: &mpsc::Sender<OutgoingMessage>,
    app_state: &Arc<AppState>,
) -> bool {
    match msg {
        IncomingMessage::Start {
            avatar_session_id,
            system_prompt,
            language,
        } => {
            if let Err(e) = start_call(
                avatar_session_id,
                system_prompt,
                language,
                state,
                message_tx,
                app_state,
            )
            .await
            {
                warn!("Call setup failed: {}", e);
                send_error(message_tx, &e).await;
            }
            true
        }
        IncomingMessage::SpeakingStarted => {
            forward_session_event(SessionEvent::SpeakingStarted, state, message_tx).await
        }
        IncomingMessage::SpeakingStopped => {
            forward_session_event(SessionEvent::SpeakingStopped, state, message_tx).await
        }
        IncomingMessage::End => {
            end_call(state).await;
            let _ = message_tx.send(OutgoingMessage::Ended).await;
            true
        }
    }
}

/// Forward binary audio to the recognition stream.
///
/// # Returns
/// * `bool` - true to continue processing, false to terminate the connection
pub async fn handle_audio_message(
    audio: bytes::Bytes,
    state: &Arc<RwLock<ConnectionState>>,
    message_tx: &mpsc::Sender<OutgoingMessage>,
) -> bool {
    // Fast path: read lock plus an atomic flag check.
    let recognizer = {
        let state_guard = state.read().await;
        if !state_guard.is_call_active() {
            send_error(message_tx, &CallSocketError::CallNotStarted).await;
            return true;
        }
        match &state_guard.recognizer {
            Some(recognizer) => recognizer.clone(),
            None => {
                send_error(message_tx, &CallSocketError::CallNotStarted).await;
                return true;
            }
        }
    };

    if let Err(e) = recognizer.write().await.send_audio(audio.to_vec()).await {
        error!("Failed to forward audio: {}", e);
        send_error(
            message_tx,
            &CallSocketError::AudioProcessing(e.to_string()),
        )
        .await;
    }
    true
}

/// Wire up one call: recognition stream, generation client, avatar session,
/// and the session event loop.
async fn start_call(
    avatar_session_id: String,
    system_prompt: Option<String>,
    language: Option<String>,
    state: &Arc<RwLock<ConnectionState>>,
    message_tx: &mpsc::Sender<OutgoingMessage>,
    app_state: &Arc<AppState>,
) -> Result<(), CallSocketError> {
    if state.read().await.is_call_active() {
        return Err(CallSocketError::CallAlreadyStarted);
    }

    // Provider configuration, all keys server-side.
    let recognizer_config = app_state
        .recognizer_config(language)
        .ok_or(CallSocketError::ProviderNotConfigured("DEEPGRAM_API_KEY"))?;
    let generation_config = app_state
        .generation_config(system_prompt)
        .ok_or(CallSocketError::ProviderNotConfigured("OPENAI_API_KEY"))?;
    let avatar_api = app_state
        .avatar_api
        .as_ref()
        .ok_or(CallSocketError::ProviderNotConfigured("HEYGEN_API_KEY"))?;

    let avatar: Arc<dyn AvatarControl> = Arc::new(avatar_api.session(avatar_session_id));
    let replies: Arc<dyn ReplyClient> = Arc::new(
        OpenAiChat::new(generation_config).map_err(|e| CallSocketError::ProviderSetup {
            provider: "generation",
            error: e.to_string(),
        })?,
    );

    let mut recognizer = <DeepgramRecognizer as BaseRecognizer>::new(recognizer_config).map_err(
        |e| CallSocketError::ProviderSetup {
            provider: "recognition",
            error: e.to_string(),
        },
    )?;

    let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(SESSION_CHANNEL_SIZE);
    let (updates_tx, mut updates_rx) = mpsc::channel::<SessionUpdate>(SESSION_CHANNEL_SIZE);

    // Recognition events go to the session queue and, as transcript
    // notifications, straight back to the client.
    let callback_events = events_tx.clone();
    let callback_messages = message_tx.clone();
    let event_callback: RecognitionCallback = Arc::new(move |event| {
        let events = callback_events.clone();
        let messages = callback_messages.clone();
        Box::pin(async move {
            if let Some(notification) = transcript_message(&event) {
                let _ = messages.send(notification).await;
            }
            let _ = events.send(SessionEvent::Recognition(event)).await;
        })
    });
    recognizer.on_event(event_callback);

    let error_messages = message_tx.clone();
    let error_callback: RecognitionErrorCallback = Arc::new(move |error| {
        let messages = error_messages.clone();
        Box::pin(async move {
            let _ = messages
                .send(OutgoingMessage::Error {
                    message: format!("Recognition stream error: {error}"),
                })
                .await;
        })
    });
    recognizer.on_error(error_callback);

    recognizer
        .connect()
        .await
        .map_err(|e| CallSocketError::RecognitionConnect(e.to_string()))?;

    // The session loop and the update forwarder.
    let session = CallSession::new(
        app_state.session_config(),
        avatar,
        replies,
        events_tx.clone(),
        updates_tx,
    );
    let session_task = tokio::spawn(session.run(events_rx));

    let forward_messages = message_tx.clone();
    let updates_task = tokio::spawn(async move {
        while let Some(update) = updates_rx.recv().await {
            let message = match update {
                SessionUpdate::UserUtterance { text } => OutgoingMessage::Utterance { text },
                SessionUpdate::AgentReply { text } => OutgoingMessage::Reply { text },
            };
            if forward_messages.send(message).await.is_err() {
                break;
            }
        }
    });

    {
        let mut state_guard = state.write().await;
        state_guard.recognizer = Some(Arc::new(RwLock::new(recognizer)));
        state_guard.session_events = Some(events_tx);
        state_guard.session_task = Some(session_task);
        state_guard.updates_task = Some(updates_task);
        state_guard.stream_id = Some(uuid::Uuid::new_v4().to_string());
        state_guard.set_call_active(true);
        info!(stream_id = ?state_guard.stream_id, "call started");
    }

    let _ = message_tx.send(OutgoingMessage::Ready).await;
    Ok(())
}

/// Forward one session event if a call is in progress.
async fn forward_session_event(
    event: SessionEvent,
    state: &Arc<RwLock<ConnectionState>>,
    message_tx: &mpsc::Sender<OutgoingMessage>,
) -> bool {
    let sender = {
        let state_guard = state.read().await;
        state_guard.session_events.clone()
    };
    match sender {
        Some(sender) => {
            let _ = sender.send(event).await;
        }
        None => {
            send_error(message_tx, &CallSocketError::CallNotStarted).await;
        }
    }
    true
}

/// Tear the call down: signal the session to shut down and close the
/// recognition stream. The session task stops the avatar session itself.
pub async fn end_call(state: &Arc<RwLock<ConnectionState>>) {
    let (sender, recognizer, updates_task) = {
        let mut state_guard = state.write().await;
        state_guard.set_call_active(false);
        (
            state_guard.session_events.take(),
            state_guard.recognizer.take(),
            state_guard.updates_task.take(),
        )
    };

    if let Some(sender) = sender {
        let _ = sender.send(SessionEvent::Shutdown).await;
    }
    if let Some(recognizer) = recognizer {
        if let Err(e) = recognizer.write().await.disconnect().await {
            error!("Failed to close recognition stream: {}", e);
        }
    }
    if let Some(task) = updates_task {
        task.abort();
    }
}

async fn send_error(message_tx: &mpsc::Sender<OutgoingMessage>, error: &CallSocketError) {
    let _ = message_tx
        .send(OutgoingMessage::Error {
            message: error.to_string(),
        })
        .await;
}
