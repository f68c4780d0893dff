//! Liveness endpoint for external uptime checks. Shares no state with the router.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const LIVENESS_TEXT: &str = "Modmail Bot Active";

pub fn router() -> Router {
    Router::new().route("/", get(liveness))
}

async fn liveness() -> &'static str {
    LIVENESS_TEXT
}

/// Bind now (so a taken port is a startup error) and serve until `shutdown` fires.
pub async fn serve(
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> std::io::Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
    let listener = TcpListener::bind((host, port)).await?;
    let addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, router())
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("health endpoint shutting down");
            })
            .await
    });

    Ok((addr, handle))
}
