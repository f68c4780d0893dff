//! Message router: ticket lifecycle and bidirectional forwarding.
//!
//! Direct messages from users land in a per-user ticket channel in the staff
//! guild; staff messages in a ticket channel go back to the owner's DMs.
//! Platform failures are logged and end the event; they never propagate.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    audit::{AuditLog, LogEntry, Sender},
    config::Config,
    domain::{ChannelId, GuildId, UserId},
    messaging::{
        port::ChatPort,
        types::{ChannelInfo, Embed, IncomingMessage, NewChannel, COLOR_STAFF, COLOR_USER},
    },
    tickets::{
        channel_name_for, find_ticket_channel, is_ticket_channel, owner_from_topic, topic_for,
        topic_names_user, TicketRegistry, UserLocks,
    },
    Result,
};

pub const REACT_RECEIVED: &str = "📩";
pub const REACT_DELIVERED: &str = "✅";
pub const CLOSED_NOTICE: &str = "🔒 Your ticket has been closed.";
pub const DELIVERY_FAILED_NOTICE: &str = "❌ Failed to send DM (DMs might be closed).";
const TICKET_CREATED_TITLE: &str = "🎫 Ticket Created";
const TICKET_CREATED_TEXT: &str =
    "Your message has been sent to the staff. Please wait for a response.";
const NEW_TICKET_TITLE: &str = "🆕 New Ticket";
const STAFF_RESPONSE_TITLE: &str = "💬 Staff Response";

#[derive(Clone, Debug)]
pub struct RouterSettings {
    pub staff_guild: GuildId,
    pub ticket_category: ChannelId,
    pub close_command: String,
}

impl From<&Config> for RouterSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            staff_guild: cfg.staff_guild_id,
            ticket_category: cfg.ticket_category_id,
            close_command: cfg.close_command.clone(),
        }
    }
}

/// What `handle` did with one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Own message, non-ticket channel, or foreign guild.
    Ignored,
    ForwardedToStaff { ticket: ChannelId, opened: bool },
    DeliveredToUser { user: UserId },
    Closed { user: UserId },
    /// Staff reply could not reach the user; staff were told.
    DeliveryFailed { user: UserId },
    /// A platform call failed; nothing was forwarded or logged.
    Abandoned,
}

pub struct MessageRouter {
    chat: Arc<dyn ChatPort>,
    audit: AuditLog,
    settings: RouterSettings,
    tickets: TicketRegistry,
    user_locks: UserLocks,
    bot_user: OnceLock<UserId>,
}

impl MessageRouter {
    pub fn new(chat: Arc<dyn ChatPort>, audit: AuditLog, settings: RouterSettings) -> Self {
        Self {
            chat,
            audit,
            settings,
            tickets: TicketRegistry::default(),
            user_locks: UserLocks::default(),
            bot_user: OnceLock::new(),
        }
    }

    /// Record the bot's own id (from the gateway ready event). First call wins.
    pub fn set_bot_user(&self, user: UserId) {
        let _ = self.bot_user.set(user);
    }

    pub fn tickets(&self) -> &TicketRegistry {
        &self.tickets
    }

    /// Rebuild the ticket registry from channel topics in the staff guild.
    pub async fn hydrate_tickets(&self) -> Result<usize> {
        let channels = self.chat.guild_channels(self.settings.staff_guild).await?;
        Ok(self
            .tickets
            .hydrate(&channels, self.settings.ticket_category)
            .await)
    }

    pub async fn handle(&self, msg: IncomingMessage) -> RouteOutcome {
        if self.bot_user.get() == Some(&msg.author.id) {
            return RouteOutcome::Ignored;
        }

        match msg.guild_id {
            None => self.handle_direct(&msg).await,
            Some(guild) if guild == self.settings.staff_guild => self.handle_staff(&msg).await,
            Some(_) => RouteOutcome::Ignored,
        }
    }

    // ============== User -> staff ==============

    async fn handle_direct(&self, msg: &IncomingMessage) -> RouteOutcome {
        let user = msg.author.id;

        let (ticket, opened) = {
            let _guard = self.user_locks.lock_user(user).await;
            match self.find_ticket(user).await {
                Ok(Some(ticket)) => (ticket, false),
                Ok(None) => match self.open_ticket(msg).await {
                    Ok(ticket) => (ticket, true),
                    Err(e) => {
                        warn!(user_id = %user, "failed to create ticket channel: {e}");
                        return RouteOutcome::Abandoned;
                    }
                },
                Err(e) => {
                    warn!(user_id = %user, "failed to look up ticket channel: {e}");
                    return RouteOutcome::Abandoned;
                }
            }
        };

        if opened {
            self.announce_ticket(msg, ticket).await;
        }

        let embed = Embed::default()
            .author(&msg.author.name, msg.author.avatar_url.clone())
            .description(msg.content.clone())
            .color(COLOR_USER)
            .image(msg.first_attachment_url());

        let copy = match self.chat.send_embed(ticket, embed).await {
            Ok(copy) => copy,
            Err(e) => {
                warn!(user_id = %user, channel_id = %ticket, "failed to forward to staff: {e}");
                return RouteOutcome::Abandoned;
            }
        };
        if let Err(e) = self.chat.add_reaction(copy, REACT_RECEIVED).await {
            debug!(channel_id = %ticket, "failed to react to forwarded message: {e}");
        }

        self.audit.record(LogEntry::new(
            user,
            &msg.content,
            Sender::User,
            msg.has_attachment(),
        ));
        RouteOutcome::ForwardedToStaff { ticket, opened }
    }

    /// Registry first (verified against the platform), then a topic scan.
    async fn find_ticket(&self, user: UserId) -> Result<Option<ChannelId>> {
        if let Some(ticket) = self.tickets.get(user).await {
            match self.chat.channel_info(ticket).await {
                Ok(Some(info)) if names_owner(&info, user) => return Ok(Some(ticket)),
                Ok(_) => {
                    self.tickets.remove_if(user, ticket).await;
                    debug!(user_id = %user, channel_id = %ticket, "evicted stale ticket entry");
                }
                Err(e) => {
                    debug!(channel_id = %ticket, "could not verify ticket channel, reusing it: {e}");
                    return Ok(Some(ticket));
                }
            }
        }

        let channels = self.chat.guild_channels(self.settings.staff_guild).await?;
        let found = find_ticket_channel(&channels, user).map(|ch| ch.id);
        if let Some(ticket) = found {
            self.tickets.insert(user, ticket).await;
        }
        Ok(found)
    }

    async fn open_ticket(&self, msg: &IncomingMessage) -> Result<ChannelId> {
        let user = msg.author.id;
        let created = self
            .chat
            .create_text_channel(
                self.settings.staff_guild,
                NewChannel {
                    name: channel_name_for(&msg.author.name),
                    parent_id: self.settings.ticket_category,
                    topic: topic_for(user),
                },
            )
            .await?;

        self.tickets.insert(user, created.id).await;
        info!(user_id = %user, channel_id = %created.id, name = %created.name, "ticket opened");
        Ok(created.id)
    }

    async fn announce_ticket(&self, msg: &IncomingMessage, ticket: ChannelId) {
        let ack = Embed::titled(TICKET_CREATED_TITLE)
            .description(TICKET_CREATED_TEXT)
            .color(COLOR_USER)
            .timestamp(Utc::now());
        if let Err(e) = self.chat.send_embed(msg.message.channel_id, ack).await {
            debug!(user_id = %msg.author.id, "failed to acknowledge ticket to user: {e}");
        }

        let notice = Embed::titled(NEW_TICKET_TITLE)
            .description(format!("User: {}", msg.author.id.mention()))
            .color(COLOR_STAFF);
        if let Err(e) = self.chat.send_embed(ticket, notice).await {
            warn!(channel_id = %ticket, "failed to announce new ticket: {e}");
        }
    }

    // ============== Staff -> user ==============

    async fn handle_staff(&self, msg: &IncomingMessage) -> RouteOutcome {
        let channel = msg.message.channel_id;
        let info = match self.chat.channel_info(channel).await {
            Ok(Some(info)) => info,
            Ok(None) => return RouteOutcome::Ignored,
            Err(e) => {
                debug!(channel_id = %channel, "failed to resolve channel: {e}");
                return RouteOutcome::Ignored;
            }
        };
        if !is_ticket_channel(&info, self.settings.ticket_category) {
            return RouteOutcome::Ignored;
        }
        let Some(owner) = info.topic.as_deref().and_then(owner_from_topic) else {
            return RouteOutcome::Ignored;
        };

        if self.is_close_command(&msg.content) {
            return self.close_ticket(owner, channel).await;
        }

        let embed = Embed::titled(STAFF_RESPONSE_TITLE)
            .description(msg.content.clone())
            .color(COLOR_STAFF)
            .image(msg.first_attachment_url());

        let delivered = match self.chat.open_dm(owner).await {
            Ok(dm) => self.chat.send_embed(dm, embed).await.map(|_| ()),
            Err(e) => Err(e),
        };

        match delivered {
            Ok(()) => {
                if let Err(e) = self.chat.add_reaction(msg.message, REACT_DELIVERED).await {
                    debug!(channel_id = %channel, "failed to react to staff message: {e}");
                }
                self.audit.record(LogEntry::new(
                    owner,
                    &msg.content,
                    Sender::Staff,
                    msg.has_attachment(),
                ));
                RouteOutcome::DeliveredToUser { user: owner }
            }
            Err(e) => {
                warn!(user_id = %owner, "failed to deliver staff reply: {e}");
                if let Err(e) = self.chat.send_text(channel, DELIVERY_FAILED_NOTICE).await {
                    warn!(channel_id = %channel, "failed to report delivery failure: {e}");
                }
                RouteOutcome::DeliveryFailed { user: owner }
            }
        }
    }

    fn is_close_command(&self, content: &str) -> bool {
        content.to_lowercase() == self.settings.close_command.to_lowercase()
    }

    async fn close_ticket(&self, owner: UserId, channel: ChannelId) -> RouteOutcome {
        let _guard = self.user_locks.lock_user(owner).await;

        if let Err(e) = self.chat.delete_channel(channel).await {
            warn!(user_id = %owner, channel_id = %channel, "failed to delete ticket channel: {e}");
            return RouteOutcome::Abandoned;
        }
        self.tickets.remove_if(owner, channel).await;
        info!(user_id = %owner, channel_id = %channel, "ticket closed");

        match self.chat.open_dm(owner).await {
            Ok(dm) => {
                if let Err(e) = self.chat.send_text(dm, CLOSED_NOTICE).await {
                    warn!(user_id = %owner, "failed to send closing notice: {e}");
                }
            }
            Err(e) => warn!(user_id = %owner, "failed to open DM for closing notice: {e}"),
        }
        RouteOutcome::Closed { user: owner }
    }
}

fn names_owner(info: &ChannelInfo, user: UserId) -> bool {
    info.topic
        .as_deref()
        .map(|t| topic_names_user(t, user))
        .unwrap_or(false)
}
