mod api;
mod auth;
mod config;
mod error;
mod gateway;
mod services;
mod state;
mod views;

#[cfg(test)]
mod testutil;

use std::net::SocketAddr;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use palaver_store::Database;

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,palaver_server=debug")),
        )
        .init();

    info!("Starting palaver server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env()?;
    info!(
        port = config.port,
        environment = ?config.environment,
        database = %config.database_path.display(),
        "Loaded configuration"
    );

    let database = Database::open_at(&config.database_path)?;
    let port = config.port;
    let state = AppState::new(config, database);

    let heartbeat = gateway::spawn_heartbeat(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    api::serve(state.clone(), addr).await?;

    // Sockets were closed with 1001 on shutdown; give in-flight store work a
    // hard deadline before the process exits regardless.
    heartbeat.abort();
    if tokio::time::timeout(Duration::from_secs(5), state.db.lock())
        .await
        .is_err()
    {
        tracing::warn!("store did not drain within 5 seconds, exiting anyway");
    }
    info!("Shutdown complete");
    Ok(())
}
