use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use modmail_core::{audit::AuditLog, config::Config};

mod health;
mod shutdown;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    modmail_core::logging::init("modmail")?;

    let cfg = Arc::new(Config::load()?);
    let log_store = store::open_store(&cfg.store)
        .await
        .context("failed to open log store")?;
    let (audit, writer) = AuditLog::spawn(log_store, cfg.log_queue_capacity);

    let shutdown = shutdown::install_signal_handler();
    let (addr, health) = health::serve(&cfg.health_host, cfg.health_port, shutdown.clone())
        .await
        .context("failed to start health endpoint")?;
    info!(%addr, "health endpoint listening");

    let result = modmail_discord::gateway::run_gateway(cfg.clone(), audit, shutdown.clone()).await;

    // The gateway can also stop on its own (auth failure, fatal close code).
    shutdown.cancel();
    match health.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("health endpoint failed: {e}"),
        Err(e) => error!("health endpoint task failed: {e}"),
    }

    let written = writer.finish().await;
    info!(written, "modmail stopped");
    result
}
