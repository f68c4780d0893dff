//! Gateway event handlers.
//!
//! Each handler converts the serenity payload into core types and hands it to
//! the `MessageRouter`; nothing Discord-specific leaks past this module.

use std::sync::{Arc, OnceLock};

use serenity::{
    all::{Context, EventHandler, Message, Ready},
    async_trait,
};
use tracing::{debug, info, warn};

use modmail_core::{
    domain::{ChannelId, GuildId, MessageId, MessageRef, UserId},
    messaging::types::{Attachment, Author, IncomingMessage},
    routing::MessageRouter,
};

/// Late-bound router: the Discord client must exist before the chat port
/// (and so the router) can be built, but the handler is registered first.
#[derive(Clone, Default)]
pub struct RouterSlot(Arc<OnceLock<Arc<MessageRouter>>>);

impl RouterSlot {
    pub fn fill(&self, router: Arc<MessageRouter>) {
        if self.0.set(router).is_err() {
            warn!("router already installed, ignoring");
        }
    }

    fn get(&self) -> Option<&Arc<MessageRouter>> {
        self.0.get()
    }
}

pub struct Handler {
    router: RouterSlot,
}

impl Handler {
    pub fn new(router: RouterSlot) -> Self {
        Self { router }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(bot = %ready.user.name, "connected to Discord");
        let Some(router) = self.router.get() else {
            return;
        };
        router.set_bot_user(UserId(ready.user.id.get()));

        match router.hydrate_tickets().await {
            Ok(count) => info!(count, "ticket registry hydrated"),
            Err(e) => warn!("failed to hydrate ticket registry: {e}"),
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let Some(router) = self.router.get() else {
            debug!("message before router was installed, dropping");
            return;
        };
        let outcome = router.handle(incoming_message(&msg)).await;
        debug!(channel_id = %msg.channel_id, ?outcome, "message routed");
    }
}

pub fn incoming_message(msg: &Message) -> IncomingMessage {
    IncomingMessage {
        message: MessageRef {
            channel_id: ChannelId(msg.channel_id.get()),
            message_id: MessageId(msg.id.get()),
        },
        author: Author {
            id: UserId(msg.author.id.get()),
            name: msg.author.name.clone(),
            avatar_url: Some(msg.author.face()),
        },
        guild_id: msg.guild_id.map(|g| GuildId(g.get())),
        content: msg.content.clone(),
        attachments: msg
            .attachments
            .iter()
            .map(|a| Attachment {
                url: a.url.clone(),
                filename: a.filename.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn message(guild_id: Option<&str>, attachments: serde_json::Value) -> Message {
        serde_json::from_value(json!({
            "id": "2001",
            "channel_id": "3001",
            "guild_id": guild_id,
            "author": {
                "id": "11",
                "username": "bob",
                "discriminator": "0",
                "global_name": null,
                "avatar": null,
                "bot": false
            },
            "content": "see pic",
            "timestamp": "2024-01-01T00:00:00.000000+00:00",
            "edited_timestamp": null,
            "tts": false,
            "mention_everyone": false,
            "mentions": [],
            "mention_roles": [],
            "mention_channels": [],
            "attachments": attachments,
            "embeds": [],
            "reactions": [],
            "pinned": false,
            "type": 0,
            "flags": 0,
            "components": [],
            "sticker_items": []
        }))
        .unwrap()
    }

    #[test]
    fn converts_guild_message_with_attachments() {
        let msg = message(
            Some("4001"),
            json!([
                {
                    "id": "5001",
                    "filename": "shot.png",
                    "size": 1024,
                    "url": "https://cdn.discordapp.com/attachments/1/2/shot.png",
                    "proxy_url": "https://media.discordapp.net/attachments/1/2/shot.png"
                },
                {
                    "id": "5002",
                    "filename": "log.txt",
                    "size": 12,
                    "url": "https://cdn.discordapp.com/attachments/1/3/log.txt",
                    "proxy_url": "https://media.discordapp.net/attachments/1/3/log.txt"
                }
            ]),
        );
        let incoming = incoming_message(&msg);

        assert_eq!(incoming.message.channel_id, ChannelId(3001));
        assert_eq!(incoming.message.message_id, MessageId(2001));
        assert_eq!(incoming.guild_id, Some(GuildId(4001)));
        assert_eq!(incoming.author.id, UserId(11));
        assert_eq!(incoming.author.name, "bob");
        assert_eq!(incoming.content, "see pic");
        assert!(!incoming.is_direct());
        assert_eq!(incoming.attachments.len(), 2);
        assert_eq!(incoming.attachments[1].filename, "log.txt");
        assert_eq!(
            incoming.first_attachment_url(),
            Some("https://cdn.discordapp.com/attachments/1/2/shot.png")
        );
    }

    #[test]
    fn converts_direct_message_without_attachments() {
        let incoming = incoming_message(&message(None, json!([])));

        assert!(incoming.is_direct());
        assert_eq!(incoming.guild_id, None);
        assert!(!incoming.has_attachment());
        assert_eq!(incoming.first_attachment_url(), None);
        // No custom avatar: the default CDN avatar is used.
        let avatar = incoming.author.avatar_url.unwrap_or_default();
        assert!(avatar.starts_with("https://cdn.discordapp.com/"), "{avatar}");
    }
}
