use async_trait::async_trait;

use crate::{
    domain::{ChannelId, GuildId, MessageRef, UserId},
    messaging::types::{ChannelInfo, Embed, NewChannel},
    Result,
};

/// Chat-platform port consumed by the router.
///
/// Every call is request/response from the router's point of view; failures
/// come back as `Error::External` and are only inspected for success/failure.
#[async_trait]
pub trait ChatPort: Send + Sync {
    /// All channels of a guild, in whatever order the platform returns them.
    async fn guild_channels(&self, guild: GuildId) -> Result<Vec<ChannelInfo>>;

    /// Metadata of one channel; `None` when it does not exist or is not a guild channel.
    async fn channel_info(&self, channel: ChannelId) -> Result<Option<ChannelInfo>>;

    async fn create_text_channel(&self, guild: GuildId, new: NewChannel) -> Result<ChannelInfo>;
    async fn delete_channel(&self, channel: ChannelId) -> Result<()>;

    async fn send_text(&self, channel: ChannelId, text: &str) -> Result<MessageRef>;
    async fn send_embed(&self, channel: ChannelId, embed: Embed) -> Result<MessageRef>;
    async fn add_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()>;

    /// Resolve (or create) the DM channel with a user.
    async fn open_dm(&self, user: UserId) -> Result<ChannelId>;
}
