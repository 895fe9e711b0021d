//! Discord REST v10 client implementing [`ChatPlatform`].

use super::model::{
    EPHEMERAL, ErrorBody, GuildMember, Message, Role, Snowflake, UnavailableGuild, message_body,
};
use async_trait::async_trait;
use incitatus_core::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
use incitatus_core::platform::{
    ChannelMessage, ChatPlatform, Member, OutgoingMessage, PlatformError,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::Url;

const MAX_RATE_LIMIT_RETRIES: usize = 3;
const HISTORY_PAGE_LIMIT: usize = 100;
const CACHE_TTL: Duration = Duration::from_secs(600);
const AUDIT_REASON: &str = "Registro automático";

/// Interaction callback types.
const CHANNEL_MESSAGE: u8 = 4;
const DEFERRED_CHANNEL_MESSAGE: u8 = 5;
const DEFERRED_UPDATE_MESSAGE: u8 = 6;

struct Cached<T> {
    value: T,
    fetched: Instant,
}

impl<T> Cached<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            fetched: Instant::now(),
        }
    }

    fn fresh(&self) -> Option<&T> {
        (self.fetched.elapsed() < CACHE_TTL).then_some(&self.value)
    }
}

/// Authenticated REST client.
///
/// Members and role lists are cached for a few minutes; leaderboard and
/// panel renders resolve many display names at once.
pub struct DiscordRest {
    http: Client,
    api_base: Url,
    authorization: String,
    self_id: OnceLock<UserId>,
    members: RwLock<HashMap<(GuildId, UserId), Cached<Option<Member>>>>,
    roles: RwLock<HashMap<GuildId, Cached<Vec<(RoleId, String)>>>>,
}

fn transport(e: reqwest::Error) -> PlatformError {
    PlatformError::Transport(e.to_string())
}

impl DiscordRest {
    pub fn new(mut api_base: Url, token: &str) -> Self {
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Self {
            http: Client::new(),
            api_base,
            authorization: format!("Bot {token}"),
            self_id: OnceLock::new(),
            members: RwLock::new(HashMap::new()),
            roles: RwLock::new(HashMap::new()),
        }
    }

    /// Record the bot's own user id, learned from the gateway READY.
    pub fn set_self_id(&self, id: UserId) {
        if self.self_id.set(id).is_err() {
            tracing::debug!(%id, "Bot user id already known");
        }
    }

    pub fn self_id(&self) -> Option<UserId> {
        self.self_id.get().copied()
    }

    fn url(&self, path: &str) -> Result<Url, PlatformError> {
        self.api_base
            .join(path)
            .map_err(|e| PlatformError::Transport(e.to_string()))
    }

    /// Send the request built by `build`, waiting out rate limits.
    async fn execute(
        &self,
        build: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<Response, PlatformError> {
        let mut attempt = 0;
        loop {
            let resp = build(&self.http)
                .header(reqwest::header::AUTHORIZATION, &self.authorization)
                .send()
                .await
                .map_err(transport)?;
            if resp.status() != StatusCode::TOO_MANY_REQUESTS || attempt >= MAX_RATE_LIMIT_RETRIES
            {
                return check_status(resp).await;
            }
            attempt += 1;
            let retry_after = resp
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.retry_after)
                .unwrap_or(1.0);
            tracing::debug!(retry_after, attempt, "Rate limited by Discord");
            tokio::time::sleep(Duration::from_secs_f64(retry_after.max(0.0))).await;
        }
    }

    async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        build: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<T, PlatformError> {
        let resp = self.execute(build).await?;
        let bytes = resp.bytes().await.map_err(transport)?;
        serde_json::from_slice(&bytes).map_err(|e| PlatformError::Api {
            status: 200,
            message: format!("malformed response: {e}"),
        })
    }

    /// The first guild the bot is a member of.
    pub async fn first_guild(&self) -> Result<Option<GuildId>, PlatformError> {
        let url = self.url("users/@me/guilds")?;
        let guilds: Vec<UnavailableGuild> = self.execute_json(|c| c.get(url.clone())).await?;
        Ok(guilds.first().map(|g| GuildId(g.id.0)))
    }

    /// Replace the guild's application commands with `commands`.
    pub async fn register_commands(
        &self,
        application: Snowflake,
        guild: GuildId,
        commands: &Value,
    ) -> Result<(), PlatformError> {
        let url = self.url(&format!(
            "applications/{}/guilds/{guild}/commands",
            application.0
        ))?;
        self.execute(|c| c.put(url.clone()).json(commands)).await?;
        Ok(())
    }

    async fn callback(
        &self,
        interaction: Snowflake,
        token: &str,
        body: Value,
    ) -> Result<(), PlatformError> {
        let url = self.url(&format!("interactions/{}/{token}/callback", interaction.0))?;
        self.execute(|c| c.post(url.clone()).json(&body)).await?;
        Ok(())
    }

    /// Answer an interaction with a text reply.
    pub async fn reply(
        &self,
        interaction: Snowflake,
        token: &str,
        content: &str,
        ephemeral: bool,
    ) -> Result<(), PlatformError> {
        let flags = if ephemeral { EPHEMERAL } else { 0 };
        self.callback(
            interaction,
            token,
            json!({ "type": CHANNEL_MESSAGE, "data": { "content": content, "flags": flags } }),
        )
        .await
    }

    /// Acknowledge an interaction whose reply follows later.
    pub async fn defer(
        &self,
        interaction: Snowflake,
        token: &str,
        ephemeral: bool,
    ) -> Result<(), PlatformError> {
        let flags = if ephemeral { EPHEMERAL } else { 0 };
        self.callback(
            interaction,
            token,
            json!({ "type": DEFERRED_CHANNEL_MESSAGE, "data": { "flags": flags } }),
        )
        .await
    }

    /// Acknowledge a button press without a visible reply.
    pub async fn acknowledge_component(
        &self,
        interaction: Snowflake,
        token: &str,
    ) -> Result<(), PlatformError> {
        self.callback(interaction, token, json!({ "type": DEFERRED_UPDATE_MESSAGE }))
            .await
    }

    /// Fill in the reply of a deferred interaction.
    pub async fn edit_original(
        &self,
        application: Snowflake,
        token: &str,
        content: &str,
    ) -> Result<(), PlatformError> {
        let url = self.url(&format!(
            "webhooks/{}/{token}/messages/@original",
            application.0
        ))?;
        let body = json!({ "content": content });
        self.execute(|c| c.patch(url.clone()).json(&body)).await?;
        Ok(())
    }

    /// Names of `roles`, in the same order, skipping unknown ids.
    pub async fn role_names(
        &self,
        guild: GuildId,
        roles: &[RoleId],
    ) -> Result<Vec<String>, PlatformError> {
        let all = self.guild_roles(guild).await?;
        Ok(roles
            .iter()
            .filter_map(|id| all.iter().find(|(rid, _)| rid == id))
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn guild_roles(&self, guild: GuildId) -> Result<Vec<(RoleId, String)>, PlatformError> {
        if let Some(roles) = self.roles.read().await.get(&guild).and_then(Cached::fresh) {
            return Ok(roles.clone());
        }
        let url = self.url(&format!("guilds/{guild}/roles"))?;
        let roles: Vec<Role> = self.execute_json(|c| c.get(url.clone())).await?;
        let roles: Vec<(RoleId, String)> = roles
            .into_iter()
            .map(|r| (RoleId(r.id.0), r.name))
            .collect();
        self.roles
            .write()
            .await
            .insert(guild, Cached::new(roles.clone()));
        Ok(roles)
    }

    /// Store a member seen on an inbound payload.
    pub async fn remember_member(&self, guild: GuildId, member: Member) {
        self.members
            .write()
            .await
            .insert((guild, member.user), Cached::new(Some(member)));
    }

    async fn forget_member(&self, guild: GuildId, user: UserId) {
        self.members.write().await.remove(&(guild, user));
    }
}

async fn check_status(resp: Response) -> Result<Response, PlatformError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status {
        StatusCode::NOT_FOUND => Err(PlatformError::NotFound),
        StatusCode::FORBIDDEN => Err(PlatformError::Forbidden),
        _ => {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or(body);
            Err(PlatformError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Multipart body carrying the JSON payload and the attached file.
fn multipart_form(message: &OutgoingMessage) -> Option<Form> {
    let attachment = message.attachment.as_ref()?;
    let file = Part::bytes(attachment.data.clone()).file_name(attachment.filename.clone());
    Some(
        Form::new()
            .text("payload_json", message_body(message).to_string())
            .part("files[0]", file),
    )
}

fn to_member(member: GuildMember, user: UserId) -> Member {
    Member {
        user,
        display_name: member.display_name().unwrap_or_else(|| format!("<{user}>")),
        roles: member.roles.iter().map(|r| RoleId(r.0)).collect(),
    }
}

#[async_trait]
impl ChatPlatform for DiscordRest {
    async fn send_message(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, PlatformError> {
        let url = self.url(&format!("channels/{channel}/messages"))?;
        let body = message_body(message);
        let sent: Message = self
            .execute_json(|c| match multipart_form(message) {
                Some(form) => c.post(url.clone()).multipart(form),
                None => c.post(url.clone()).json(&body),
            })
            .await?;
        Ok(MessageId(sent.id.0))
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        update: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        let url = self.url(&format!("channels/{channel}/messages/{message}"))?;
        let body = message_body(update);
        self.execute(|c| c.patch(url.clone()).json(&body)).await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError> {
        let url = self.url(&format!("channels/{channel}/messages/{message}"))?;
        self.execute(|c| c.delete(url.clone())).await?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>, PlatformError> {
        let mut url = self.url(&format!("channels/{channel}/messages"))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.clamp(1, HISTORY_PAGE_LIMIT).to_string());
        let messages: Vec<Message> = self.execute_json(|c| c.get(url.clone())).await?;
        let self_id = self.self_id();
        Ok(messages
            .into_iter()
            .map(|m| {
                let author = UserId(m.author.id.0);
                ChannelMessage {
                    id: MessageId(m.id.0),
                    author,
                    from_self: Some(author) == self_id,
                    attachment_names: m.attachments.into_iter().map(|a| a.filename).collect(),
                }
            })
            .collect())
    }

    async fn member(&self, guild: GuildId, user: UserId) -> Result<Option<Member>, PlatformError> {
        if let Some(member) = self
            .members
            .read()
            .await
            .get(&(guild, user))
            .and_then(Cached::fresh)
        {
            return Ok(member.clone());
        }
        let url = self.url(&format!("guilds/{guild}/members/{user}"))?;
        let member = match self.execute_json::<GuildMember>(|c| c.get(url.clone())).await {
            Ok(member) => Some(to_member(member, user)),
            Err(PlatformError::NotFound) => None,
            Err(e) => return Err(e),
        };
        self.members
            .write()
            .await
            .insert((guild, user), Cached::new(member.clone()));
        Ok(member)
    }

    async fn role_by_name(
        &self,
        guild: GuildId,
        name: &str,
    ) -> Result<Option<RoleId>, PlatformError> {
        Ok(self
            .guild_roles(guild)
            .await?
            .into_iter()
            .find(|(_, role_name)| role_name == name)
            .map(|(id, _)| id))
    }

    async fn add_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
    ) -> Result<(), PlatformError> {
        let url = self.url(&format!("guilds/{guild}/members/{user}/roles/{role}"))?;
        self.execute(|c| c.put(url.clone()).header("X-Audit-Log-Reason", AUDIT_REASON))
            .await?;
        self.forget_member(guild, user).await;
        Ok(())
    }

    async fn remove_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
    ) -> Result<(), PlatformError> {
        let url = self.url(&format!("guilds/{guild}/members/{user}/roles/{role}"))?;
        self.execute(|c| c.delete(url.clone()).header("X-Audit-Log-Reason", AUDIT_REASON))
            .await?;
        self.forget_member(guild, user).await;
        Ok(())
    }

    async fn set_nickname(
        &self,
        guild: GuildId,
        user: UserId,
        nickname: Option<&str>,
    ) -> Result<(), PlatformError> {
        let url = self.url(&format!("guilds/{guild}/members/{user}"))?;
        let body = json!({ "nick": nickname });
        self.execute(|c| {
            c.patch(url.clone())
                .header("X-Audit-Log-Reason", AUDIT_REASON)
                .json(&body)
        })
        .await?;
        self.forget_member(guild, user).await;
        Ok(())
    }
}
