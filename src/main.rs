//! Duel Kiosk Server
//!
//! Serves both kiosks over WebSocket until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use duel_kiosk::{
    network::AuthConfig, GameServer, OracleConfig, ServerConfig, Services, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Duel Kiosk Server v{}", VERSION);

    let config = ServerConfig::from_env();
    let auth = AuthConfig::from_env();
    if !auth.is_configured() {
        warn!("No PASSWORD set, any client may take a seat");
    }
    let oracles = OracleConfig::from_env();
    info!(
        board = %oracles.board_program.display(),
        paths = %oracles.path_program.display(),
        api = %oracles.wiki_api_url,
        "oracles configured"
    );

    let server = Arc::new(GameServer::new(config, auth, Services::from_config(&oracles)));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal_server.shutdown();
        }
    });

    server.run().await.context("server failed")?;
    info!("Server stopped");
    Ok(())
}
