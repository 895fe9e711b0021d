//! The seam between the bot's logic and the chat platform.
//!
//! Everything the processors need from the platform goes through
//! [`ChatPlatform`]. The server crate provides the real implementation;
//! tests use an in-memory recorder.

mod message;

pub use message::{Attachment, Button, ButtonStyle, Embed, EmbedField, OutgoingMessage};

use crate::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a [`ChatPlatform`] implementation.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The target (message, member, channel) does not exist.
    #[error("not found")]
    NotFound,

    /// The bot lacks the permission to perform the action.
    #[error("missing permission")]
    Forbidden,

    /// The request never got a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The platform rejected the request.
    #[error("platform error: status {status}: {message}")]
    Api { status: u16, message: String },
}

/// A message read back from channel history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: MessageId,
    pub author: UserId,
    /// Whether the bot itself authored the message.
    pub from_self: bool,
    pub attachment_names: Vec<String>,
}

/// A guild member as seen by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user: UserId,
    pub display_name: String,
    pub roles: Vec<RoleId>,
}

/// The identity and rights of whoever triggered an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user: UserId,
    pub display_name: String,
    /// Holds the manage-guild permission.
    pub manage_guild: bool,
    pub role_ids: Vec<RoleId>,
    pub role_names: Vec<String>,
}

impl Caller {
    /// Administrative actions are open to managers and to holders of the
    /// named admin role.
    pub fn is_admin(&self, admin_role: &str) -> bool {
        self.manage_guild
            || self
                .role_names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(admin_role))
    }

    pub fn has_role(&self, role: RoleId) -> bool {
        self.role_ids.contains(&role)
    }
}

/// Outbound operations on the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_message(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, PlatformError>;

    /// Replace the message in place. Fails with [`PlatformError::NotFound`]
    /// when the message no longer exists.
    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        update: &OutgoingMessage,
    ) -> Result<(), PlatformError>;

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError>;

    /// Up to `limit` messages, newest first.
    async fn recent_messages(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>, PlatformError>;

    async fn member(&self, guild: GuildId, user: UserId) -> Result<Option<Member>, PlatformError>;

    async fn role_by_name(&self, guild: GuildId, name: &str)
    -> Result<Option<RoleId>, PlatformError>;

    async fn add_role(&self, guild: GuildId, user: UserId, role: RoleId)
    -> Result<(), PlatformError>;

    async fn remove_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
    ) -> Result<(), PlatformError>;

    /// Set or (with `None`) clear the member's server nickname.
    async fn set_nickname(
        &self,
        guild: GuildId,
        user: UserId,
        nickname: Option<&str>,
    ) -> Result<(), PlatformError>;
}

/// Display name of `user`, or `<id>` when the member cannot be resolved.
pub async fn display_name(platform: &dyn ChatPlatform, guild: GuildId, user: UserId) -> String {
    match platform.member(guild, user).await {
        Ok(Some(member)) => member.display_name,
        Ok(None) => format!("<{user}>"),
        Err(e) => {
            tracing::debug!(%user, error = %e, "member lookup failed");
            format!("<{user}>")
        }
    }
}

/// [`display_name`] for each user, in order.
pub async fn display_names(
    platform: &dyn ChatPlatform,
    guild: GuildId,
    users: &[UserId],
) -> Vec<String> {
    let mut names = Vec::with_capacity(users.len());
    for user in users {
        names.push(display_name(platform, guild, *user).await);
    }
    names
}
