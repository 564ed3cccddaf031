//! Verbatim transcription relay.
//!
//! `/listen` is a persistent byte-pipe between a browser and the recognition
//! provider: client binary frames are forwarded upstream as-is, provider
//! text events are forwarded downstream as-is. The provider connection is
//! the fragile half: when it drops, one fresh connection is opened
//! transparently and forwarding resumes without closing the client-facing
//! socket. A periodic keepalive frame holds the provider socket open across
//! quiet stretches.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use bytes::Bytes;
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message as UpstreamMessage;
use tracing::{debug, error, info, warn};

use crate::core::recognition::{open_provider_socket, ProviderSocket, KEEPALIVE_FRAME};
use crate::state::AppState;

type ClientSink = SplitSink<WebSocket, Message>;

/// Why one provider-connection span of the relay ended.
enum RelayExit {
    /// The client closed or failed; the relay is done.
    ClientGone,
    /// The provider connection was lost. `pending` carries an audio frame
    /// that failed to send and should be replayed on the next connection.
    UpstreamLost { pending: Option<Bytes> },
}

/// Relay WebSocket upgrade handler.
pub async fn relay_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("Relay connection upgrade requested");
    ws.on_upgrade(move |socket| handle_relay_socket(socket, state))
}

async fn handle_relay_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut client_sink, mut client_stream) = socket.split();

    let Some(config) = app_state.recognizer_config(None) else {
        warn!("Relay rejected: DEEPGRAM_API_KEY is not configured");
        let _ = client_sink
            .send(error_frame("Recognition provider is not configured"))
            .await;
        return;
    };

    let mut upstream = match open_provider_socket(&config).await {
        Ok(socket) => socket,
        Err(e) => {
            error!("Relay failed to reach provider: {}", e);
            let _ = client_sink
                .send(error_frame("Recognition provider is unavailable"))
                .await;
            return;
        }
    };
    info!("Relay connected to provider");

    let keepalive_period = Duration::from_secs(config.keepalive_secs.max(1));
    let mut replay: Option<Bytes> = None;

    // One iteration per provider connection; a lost connection gets exactly
    // one transparent replacement before the next span begins.
    loop {
        let exit = relay_span(
            &mut upstream,
            &mut client_sink,
            &mut client_stream,
            replay.take(),
            keepalive_period,
        )
        .await;

        match exit {
            RelayExit::ClientGone => break,
            RelayExit::UpstreamLost { pending } => {
                info!("Relay reopening provider connection");
                match open_provider_socket(&config).await {
                    Ok(socket) => {
                        info!("Relay provider connection restored");
                        upstream = socket;
                        replay = pending;
                    }
                    Err(e) => {
                        error!("Relay reconnect failed: {}", e);
                        let _ = client_sink
                            .send(error_frame("Recognition provider is unavailable"))
                            .await;
                        break;
                    }
                }
            }
        }
    }

    info!("Relay connection terminated");
}

/// Forward frames both ways over one provider connection until either side
/// is lost.
async fn relay_span(
    upstream: &mut ProviderSocket,
    client_sink: &mut ClientSink,
    client_stream: &mut futures::stream::SplitStream<WebSocket>,
    replay: Option<Bytes>,
    keepalive_period: Duration,
) -> RelayExit {
    // Replay the frame that was in flight when the previous connection died.
    if let Some(audio) = replay {
        debug!("relay: replaying {} bytes after reconnect", audio.len());
        if upstream
            .send(UpstreamMessage::Binary(audio.clone()))
            .await
            .is_err()
        {
            return RelayExit::UpstreamLost {
                pending: Some(audio),
            };
        }
    }

    let mut keepalive = tokio::time::interval(keepalive_period);
    keepalive.tick().await; // first tick completes immediately

    loop {
        tokio::select! {
            client_msg = client_stream.next() => {
                match client_msg {
                    Some(Ok(Message::Binary(audio))) => {
                        debug!("relay: {} bytes of client audio", audio.len());
                        if upstream.send(UpstreamMessage::Binary(audio.clone())).await.is_err() {
                            return RelayExit::UpstreamLost { pending: Some(audio) };
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!("relay: ignoring client text frame ({} bytes)", text.len());
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Relay client disconnected");
                        return RelayExit::ClientGone;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Relay client socket error: {}", e);
                        return RelayExit::ClientGone;
                    }
                }
            }

            upstream_msg = upstream.next() => {
                match upstream_msg {
                    Some(Ok(UpstreamMessage::Text(event))) => {
                        // Provider events pass through verbatim.
                        if client_sink.send(Message::Text(event.as_str().into())).await.is_err() {
                            info!("Relay client went away");
                            return RelayExit::ClientGone;
                        }
                    }
                    Some(Ok(UpstreamMessage::Close(frame))) => {
                        info!("Provider closed relay stream: {:?}", frame);
                        return RelayExit::UpstreamLost { pending: None };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Provider stream error: {}", e);
                        return RelayExit::UpstreamLost { pending: None };
                    }
                    None => {
                        info!("Provider stream ended");
                        return RelayExit::UpstreamLost { pending: None };
                    }
                }
            }

            _ = keepalive.tick() => {
                debug!("relay: provider keepalive");
                if upstream.send(UpstreamMessage::Text(KEEPALIVE_FRAME.into())).await.is_err() {
                    return RelayExit::UpstreamLost { pending: None };
                }
            }
        }
    }
}

fn error_frame(message: &str) -> Message {
    Message::Text(
        serde_json::json!({ "type": "error", "message": message })
            .to_string()
            .into(),
    )
}
