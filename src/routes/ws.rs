use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::handlers::{relay, ws};
use crate::state::AppState;
use std::sync::Arc;

/// Create the WebSocket router.
///
/// `/ws` carries a full call (audio in, transcripts and replies out);
/// `/listen` is the verbatim transcription relay. Neither endpoint is
/// authenticated; provider keys never leave the server, and deployments
/// that need access control put it at the proxy layer.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(ws::call_handler))
        .route("/listen", get(relay::relay_handler))
        .layer(TraceLayer::new_for_http())
}
