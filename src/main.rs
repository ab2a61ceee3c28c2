//! Collaborative Canvas Sync Server
//!
//! Standalone WebSocket server. Configuration comes from the environment;
//! see [`collab_canvas::Config::from_env`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use collab_canvas::{Config, SyncServer, MAX_CHAT, MAX_HISTORY, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_env()?;

    info!("Collab Canvas Server v{}", VERSION);
    info!("History depth: {}, chat log: {}", MAX_HISTORY, MAX_CHAT);
    info!(
        "Max connections: {}, max message: {} bytes",
        config.server.max_connections, config.server.max_message_bytes
    );

    let server = Arc::new(SyncServer::new(config.server, config.limits));

    {
        let server = server.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => server.shutdown(),
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        });
    }

    server.run().await?;

    // Let connection tasks send `shutdown` and run their disconnect.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while server.connection_count() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    info!("Server stopped");
    Ok(())
}
