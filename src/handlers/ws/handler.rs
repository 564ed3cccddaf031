//! Axum WebSocket handler for the call socket.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::state::AppState;

use super::{
    messages::{IncomingMessage, OutgoingMessage},
    processor::{end_call, handle_audio_message, handle_incoming_message},
    state::ConnectionState,
};

/// Outbound channel depth; sized for bursts of transcript notifications.
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Call socket upgrade handler.
pub async fn call_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("Call socket upgrade requested");
    ws.on_upgrade(move |socket| handle_call_socket(socket, state))
}

/// Manage one call socket for its whole lifetime.
async fn handle_call_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("Call socket established");

    let (mut sender, mut receiver) = socket.split();
    let state = Arc::new(RwLock::new(ConnectionState::new()));
    let (message_tx, mut message_rx) = mpsc::channel::<OutgoingMessage>(CHANNEL_BUFFER_SIZE);

    // Outgoing messages are serialized and sent from their own task so
    // handlers never block on the socket.
    let sender_task = tokio::spawn(async move {
        while let Some(message) = message_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize outgoing message: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json.into())).await {
                error!("Failed to send message to client: {}", e);
                break;
            }
        }
    });

    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(msg) => {
                if !process_message(msg, &state, &message_tx, &app_state).await {
                    break;
                }
            }
            Err(e) => {
                warn!("Call socket error: {}", e);
                break;
            }
        }
    }

    // Tear down whatever the call left running; the session task stops the
    // avatar session on shutdown.
    end_call(&state).await;
    let session_task = state.write().await.session_task.take();
    if let Some(task) = session_task {
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            warn!("Session task did not stop in time");
        }
    }
    sender_task.abort();

    info!("Call socket terminated");
}

/// Dispatch one raw socket message.
async fn process_message(
    msg: Message,
    state: &Arc<RwLock<ConnectionState>>,
    message_tx: &mpsc::Sender<OutgoingMessage>,
    app_state: &Arc<AppState>,
) -> bool {
    match msg {
        Message::Text(text) => {
            debug!("Received control message: {} bytes", text.len());
            let incoming: IncomingMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("Failed to parse incoming message: {}", e);
                    let _ = message_tx
                        .send(OutgoingMessage::Error {
                            message: format!("Invalid message format: {e}"),
                        })
                        .await;
                    return true;
                }
            };
            handle_incoming_message(incoming, state, message_tx, app_state).await
        }
        Message::Binary(audio) => {
            debug!("Received audio frame: {} bytes", audio.len());
            handle_audio_message(audio, state, message_tx).await
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            info!("Call socket closed by client");
            false
        }
    }
}
