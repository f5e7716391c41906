use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::{config::RelayConfig, state::AppState};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatrelay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env();
    tracing::info!(
        "Starting chat relay (static dir {}, send buffer {})",
        config.static_dir.display(),
        config.send_buffer
    );

    let addr = config.addr;
    let state = Arc::new(AppState::new(config));
    let app = chatrelay::app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Chat server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await
}
