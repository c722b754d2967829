//! Scroll of Seven Seals server
//!
//! Axum backend serving the session API over an in-process realtime store.

use anyhow::Context;
use seals_server::{App, ServerConfig, handler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    let addr = config.addr;
    let app = App::in_memory(config.game);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!("Server listening on {addr}");
    tracing::info!("  - Sessions: http://{addr}/api/sessions");
    tracing::info!("  - Leaderboard: http://{addr}/api/leaderboard");

    axum::serve(listener, handler::router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server terminated unexpectedly")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
