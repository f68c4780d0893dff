use chrono::{DateTime, Utc};

use crate::domain::{ChannelId, GuildId, MessageRef, UserId};

pub const COLOR_USER: u32 = 0x2ecc71;
pub const COLOR_STAFF: u32 = 0x3498db;

/// Inbound message event, already stripped of platform types.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub message: MessageRef,
    pub author: Author,
    /// `None` for direct messages.
    pub guild_id: Option<GuildId>,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl IncomingMessage {
    pub fn is_direct(&self) -> bool {
        self.guild_id.is_none()
    }

    pub fn has_attachment(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Only the first attachment is carried across, as an embed image.
    pub fn first_attachment_url(&self) -> Option<&str> {
        self.attachments.first().map(|a| a.url.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
}

/// Guild channel metadata the router cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub parent_id: Option<ChannelId>,
    pub topic: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewChannel {
    pub name: String,
    pub parent_id: ChannelId,
    pub topic: String,
}

/// Rich message payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub author: Option<EmbedAuthor>,
    pub image_url: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmbedAuthor {
    pub name: String,
    pub icon_url: Option<String>,
}

impl Embed {
    pub fn titled(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn author(mut self, name: &str, icon_url: Option<String>) -> Self {
        self.author = Some(EmbedAuthor {
            name: name.to_string(),
            icon_url,
        });
        self
    }

    pub fn image(mut self, url: Option<&str>) -> Self {
        self.image_url = url.map(|u| u.to_string());
        self
    }

    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }
}
