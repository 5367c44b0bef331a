//! Multi-room Chat Server - Entry Point
//!
//! Loads the configuration, starts the server, and stops it on Ctrl-C.

use std::env;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use room_chat::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=room_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("room_chat=info")),
        )
        .init();

    // Optional JSON config file as the first argument
    let config = match env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            ServerConfig::load(&path)?
        }
        None => ServerConfig::default(),
    };

    let server = Arc::new(Server::new(config.clone()));
    server.start(config.bind_addr).await?;
    info!(
        "Chat server started, serving up to {} clients",
        config.max_clients
    );

    let stopper = Arc::clone(&server);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Stopping the server");
        if let Err(e) = stopper.stop() {
            error!("Failed to stop server: {}", e);
        }
    });

    server.join().await?;
    info!("Server ended");

    Ok(())
}
