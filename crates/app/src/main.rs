//! Channelog - admission task publisher
//!
//! Main entry point: loads configuration, starts the connection supervisor
//! and runs until SIGINT or SIGTERM.

use anyhow::Context;
use channelog_app::AppContext;
use channelog_infra::{config, init_tracing, LogFormat};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before logging so CHANNELOG_LOG_FORMAT and RUST_LOG apply
    let dotenv = dotenvy::dotenv();
    init_tracing(LogFormat::from_env()).context("failed to initialise logging")?;
    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(e) => tracing::debug!(error = %e, "No .env file loaded"),
    }

    let config = config::load().context("failed to load configuration")?;
    info!(
        broker = %config.broker.redacted_url(),
        queue = %config.broker.queue_name,
        pool = config.broker.max_channel_pool,
        "Configuration loaded"
    );

    let ctx = AppContext::new(config).context("failed to build application context")?;
    ctx.start().context("failed to start connection supervisor")?;

    shutdown_signal().await;

    if let Err(e) = ctx.shutdown().await {
        error!(error = %e, "Shutdown did not complete cleanly");
        return Err(e.into());
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "Failed to register SIGTERM handler; waiting for Ctrl+C only");
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        () = wait_for_ctrl_c() => {}
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
