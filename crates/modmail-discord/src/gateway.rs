use std::sync::Arc;

use anyhow::Context as _;
use serenity::{all::GatewayIntents, Client};
use tokio_util::sync::CancellationToken;
use tracing::info;

use modmail_core::{
    audit::AuditLog,
    config::Config,
    messaging::port::ChatPort,
    routing::{MessageRouter, RouterSettings},
};

use crate::handlers::{Handler, RouterSlot};
use crate::DiscordGateway;

pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

/// Connect to Discord and dispatch events until `shutdown` fires or the gateway fails.
pub async fn run_gateway(
    cfg: Arc<Config>,
    audit: AuditLog,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let slot = RouterSlot::default();
    let mut client = Client::builder(&cfg.discord_token, intents())
        .event_handler(Handler::new(slot.clone()))
        .await
        .context("failed to build Discord client")?;

    let chat: Arc<dyn ChatPort> = Arc::new(DiscordGateway::new(
        client.http.clone(),
        client.cache.clone(),
    ));
    slot.fill(Arc::new(MessageRouter::new(
        chat,
        audit,
        RouterSettings::from(cfg.as_ref()),
    )));

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        info!("closing Discord gateway");
        shard_manager.shutdown_all().await;
    });

    info!(
        guild_id = %cfg.staff_guild_id,
        category_id = %cfg.ticket_category_id,
        "starting Discord gateway"
    );
    client.start().await.context("Discord gateway failed")?;
    Ok(())
}
