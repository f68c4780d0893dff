//! Discord adapter (serenity).
//!
//! This crate implements the `modmail-core` ChatPort over the Discord REST API
//! and feeds gateway message events into the router.

use std::sync::Arc;

use async_trait::async_trait;

use serenity::{
    all::{
        ChannelType, CreateChannel, CreateEmbed, CreateEmbedAuthor, CreateMessage, GuildChannel,
        ReactionType, Timestamp,
    },
    cache::Cache,
    http::{Http, HttpError},
    model::channel::Channel,
};

pub mod gateway;
pub mod handlers;

use modmail_core::{
    domain::{ChannelId, GuildId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::ChatPort,
        types::{ChannelInfo, Embed, NewChannel},
    },
    Result,
};

#[derive(Clone)]
pub struct DiscordGateway {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl DiscordGateway {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    fn http(&self) -> &Http {
        &self.http
    }

    fn dc_channel(id: ChannelId) -> serenity::all::ChannelId {
        serenity::all::ChannelId::new(id.0)
    }

    fn dc_guild(id: GuildId) -> serenity::all::GuildId {
        serenity::all::GuildId::new(id.0)
    }

    fn dc_user(id: UserId) -> serenity::all::UserId {
        serenity::all::UserId::new(id.0)
    }

    fn dc_message(id: MessageId) -> serenity::all::MessageId {
        serenity::all::MessageId::new(id.0)
    }

    fn map_err(e: serenity::Error) -> Error {
        Error::External(format!("discord error: {e}"))
    }

    fn message_ref(msg: &serenity::all::Message) -> MessageRef {
        MessageRef {
            channel_id: ChannelId(msg.channel_id.get()),
            message_id: MessageId(msg.id.get()),
        }
    }
}

pub(crate) fn channel_info(ch: &GuildChannel) -> ChannelInfo {
    ChannelInfo {
        id: ChannelId(ch.id.get()),
        name: ch.name.clone(),
        parent_id: ch.parent_id.map(|p| ChannelId(p.get())),
        topic: ch.topic.clone(),
    }
}

pub(crate) fn is_not_found(e: &serenity::Error) -> bool {
    matches!(
        e,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp))
            if resp.status_code.as_u16() == 404
    )
}

pub(crate) fn build_embed(embed: Embed) -> CreateEmbed {
    let mut out = CreateEmbed::new();
    if let Some(title) = embed.title {
        out = out.title(title);
    }
    // Discord rejects empty descriptions (attachment-only messages).
    if let Some(text) = embed.description.filter(|t| !t.is_empty()) {
        out = out.description(text);
    }
    if let Some(color) = embed.color {
        out = out.colour(color);
    }
    if let Some(author) = embed.author {
        let mut a = CreateEmbedAuthor::new(author.name);
        if let Some(url) = author.icon_url {
            a = a.icon_url(url);
        }
        out = out.author(a);
    }
    if let Some(url) = embed.image_url {
        out = out.image(url);
    }
    if let Some(ts) = embed.timestamp {
        if let Ok(ts) = Timestamp::from_unix_timestamp(ts.timestamp()) {
            out = out.timestamp(ts);
        }
    }
    out
}

#[async_trait]
impl ChatPort for DiscordGateway {
    async fn guild_channels(&self, guild: GuildId) -> Result<Vec<ChannelInfo>> {
        let channels = self
            .http
            .get_channels(Self::dc_guild(guild))
            .await
            .map_err(Self::map_err)?;
        Ok(channels.iter().map(channel_info).collect())
    }

    async fn channel_info(&self, channel: ChannelId) -> Result<Option<ChannelInfo>> {
        let id = Self::dc_channel(channel);
        if let Some(ch) = self.cache.channel(id) {
            return Ok(Some(channel_info(&ch)));
        }

        match self.http.get_channel(id).await {
            Ok(Channel::Guild(ch)) => Ok(Some(channel_info(&ch))),
            Ok(_) => Ok(None),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Self::map_err(e)),
        }
    }

    async fn create_text_channel(&self, guild: GuildId, new: NewChannel) -> Result<ChannelInfo> {
        let builder = CreateChannel::new(new.name)
            .kind(ChannelType::Text)
            .category(Self::dc_channel(new.parent_id))
            .topic(new.topic);
        let ch = Self::dc_guild(guild)
            .create_channel(self.http(), builder)
            .await
            .map_err(Self::map_err)?;
        Ok(channel_info(&ch))
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<()> {
        Self::dc_channel(channel)
            .delete(self.http())
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_text(&self, channel: ChannelId, text: &str) -> Result<MessageRef> {
        let msg = Self::dc_channel(channel)
            .say(self.http(), text)
            .await
            .map_err(Self::map_err)?;
        Ok(Self::message_ref(&msg))
    }

    async fn send_embed(&self, channel: ChannelId, embed: Embed) -> Result<MessageRef> {
        let msg = Self::dc_channel(channel)
            .send_message(self.http(), CreateMessage::new().embed(build_embed(embed)))
            .await
            .map_err(Self::map_err)?;
        Ok(Self::message_ref(&msg))
    }

    async fn add_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        Self::dc_channel(msg.channel_id)
            .create_reaction(
                self.http(),
                Self::dc_message(msg.message_id),
                ReactionType::Unicode(emoji.to_string()),
            )
            .await
            .map_err(Self::map_err)
    }

    async fn open_dm(&self, user: UserId) -> Result<ChannelId> {
        let dm = Self::dc_user(user)
            .create_dm_channel(self.http())
            .await
            .map_err(Self::map_err)?;
        Ok(ChannelId(dm.id.get()))
    }
}
