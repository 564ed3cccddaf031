use axum::{routing::get, Router};
use tokio::net::TcpListener;

use anyhow::anyhow;

use charla::{routes, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Load configuration
    let config = ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    let address = config.address();

    // Create application state
    let app_state = AppState::new(config);

    // Public health check route plus API and WebSocket routes
    let app = Router::new()
        .route("/", get(charla::handlers::api::health_check))
        .merge(routes::api::create_api_router())
        .merge(routes::ws::create_ws_router())
        .with_state(app_state);

    let listener = TcpListener::bind(&address).await?;
    println!("Server listening on {address}");

    axum::serve(listener, app).await?;

    Ok(())
}
