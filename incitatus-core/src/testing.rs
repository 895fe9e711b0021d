//! In-memory fakes shared by the unit tests.

use crate::config::ChannelRole;
use crate::context::BotContext;
use crate::config::BotSettings;
use crate::entities::{Ledgers, ReplaceRoster};
use crate::framework::{LedgerProcessor, StoragePaths};
use crate::game_data::{GameDataError, GameDataSource};
use crate::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
use crate::platform::{Caller, ChannelMessage, ChatPlatform, Member, OutgoingMessage, PlatformError};
use async_trait::async_trait;
use incitatus_sdk::client::ClientError;
use incitatus_sdk::objects::{FameTotal, GuildMember, LifetimeStatistics, PlayerSummary};
use kanau::processor::Processor;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const ALLIED_GUILD: &str = "allied-guild";

pub async fn ledgers_in(dir: &Path) -> LedgerProcessor {
    let paths = StoragePaths::in_dir(dir);
    LedgerProcessor {
        ledgers: Arc::new(Ledgers::open(&paths).await.unwrap()),
    }
}

pub fn admin(id: u64) -> Caller {
    Caller {
        user: UserId(id),
        display_name: format!("admin-{id}"),
        manage_guild: true,
        role_ids: vec![],
        role_names: vec![],
    }
}

pub fn member(id: u64) -> Caller {
    Caller {
        user: UserId(id),
        display_name: format!("member-{id}"),
        manage_guild: false,
        role_ids: vec![],
        role_names: vec![],
    }
}

pub fn player(name: &str, guild_id: Option<&str>, guild_name: Option<&str>) -> PlayerSummary {
    PlayerSummary {
        id: format!("id-{name}"),
        name: name.to_string(),
        guild_id: guild_id.map(str::to_string),
        guild_name: guild_name.map(str::to_string),
        alliance_id: None,
    }
}

pub fn guild_member(name: &str, pvp: u64, pve: u64) -> GuildMember {
    GuildMember {
        name: name.to_string(),
        kill_fame: pvp,
        lifetime_statistics: LifetimeStatistics {
            pve: FameTotal { total: pve },
        },
    }
}

// ---------------------------------------------------------------------------
// TestBot
// ---------------------------------------------------------------------------

pub struct TestBot {
    pub ctx: BotContext,
    pub platform: Arc<FakePlatform>,
    pub game_data: Arc<FakeGameData>,
    _dir: TempDir,
}

impl TestBot {
    pub const SELF_ID: UserId = UserId(4242);
    pub const GUILD: GuildId = GuildId(1);

    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("alliance.json"),
            format!(r#"{{"Guilds": [{{"Id": "{ALLIED_GUILD}", "Name": "Roma"}}]}}"#),
        )
        .unwrap();

        let platform = Arc::new(FakePlatform::default());
        let game_data = Arc::new(FakeGameData::default());
        let ctx = BotContext::open(
            Self::GUILD,
            &StoragePaths::in_dir(dir.path()),
            platform.clone(),
            game_data.clone(),
            BotSettings::default(),
        )
        .await
        .unwrap();

        Self {
            ctx,
            platform,
            game_data,
            _dir: dir,
        }
    }

    pub async fn bind(&self, role: ChannelRole, channel: ChannelId) {
        self.ctx
            .config
            .update(|config| *role.slot(config) = Some(channel))
            .await
            .unwrap();
    }

    pub async fn seed_roster(&self, names: &[&str]) {
        self.ctx
            .ledgers
            .process(ReplaceRoster {
                names: names.iter().map(|s| s.to_string()).collect(),
            })
            .await
            .unwrap();
    }
}

// ---------------------------------------------------------------------------
// FakePlatform
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PlatformState {
    next_id: u64,
    live: HashMap<(ChannelId, MessageId), OutgoingMessage>,
    sent: Vec<(ChannelId, MessageId, OutgoingMessage)>,
    edits: Vec<(ChannelId, MessageId, OutgoingMessage)>,
    deleted: Vec<(ChannelId, MessageId)>,
    /// Oldest first.
    history: HashMap<ChannelId, Vec<ChannelMessage>>,
    members: HashMap<UserId, String>,
    roles: HashMap<String, RoleId>,
    member_roles: HashMap<UserId, Vec<RoleId>>,
    nicknames: HashMap<UserId, String>,
    deny_sends: HashSet<ChannelId>,
    deny_delete: HashSet<MessageId>,
    deny_roles: bool,
    deny_nicknames: bool,
    /// Consumed by the next lookup of that member.
    member_delays: HashMap<UserId, Duration>,
    send_delay: Option<Duration>,
}

/// Records every call and keeps just enough state to answer reads.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    pub fn sent(&self) -> Vec<(ChannelId, MessageId, OutgoingMessage)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_to(&self, channel: ChannelId) -> Vec<OutgoingMessage> {
        self.sent()
            .into_iter()
            .filter(|(c, _, _)| *c == channel)
            .map(|(_, _, m)| m)
            .collect()
    }

    pub fn edits(&self) -> Vec<(ChannelId, MessageId, OutgoingMessage)> {
        self.state.lock().unwrap().edits.clone()
    }

    pub fn deleted(&self) -> Vec<(ChannelId, MessageId)> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn message(&self, channel: ChannelId, id: MessageId) -> Option<OutgoingMessage> {
        self.state.lock().unwrap().live.get(&(channel, id)).cloned()
    }

    /// Newest live message in `channel`.
    pub fn current(&self, channel: ChannelId) -> Option<OutgoingMessage> {
        let state = self.state.lock().unwrap();
        state
            .live
            .iter()
            .filter(|((c, _), _)| *c == channel)
            .max_by_key(|((_, id), _)| *id)
            .map(|(_, m)| m.clone())
    }

    /// Delete a message behind the bot's back.
    pub fn forget(&self, channel: ChannelId, id: MessageId) {
        let mut state = self.state.lock().unwrap();
        state.live.remove(&(channel, id));
        if let Some(history) = state.history.get_mut(&channel) {
            history.retain(|m| m.id != id);
        }
    }

    pub fn push_history(&self, channel: ChannelId, message: ChannelMessage) {
        let mut state = self.state.lock().unwrap();
        state.history.entry(channel).or_default().push(message);
    }

    pub fn add_member(&self, user: UserId, name: &str) {
        self.state.lock().unwrap().members.insert(user, name.to_string());
    }

    pub fn add_role_named(&self, name: &str) -> RoleId {
        let mut state = self.state.lock().unwrap();
        let role = RoleId(9_000 + state.roles.len() as u64);
        state.roles.insert(name.to_string(), role);
        role
    }

    pub fn roles_of(&self, user: UserId) -> Vec<RoleId> {
        let state = self.state.lock().unwrap();
        state.member_roles.get(&user).cloned().unwrap_or_default()
    }

    pub fn nickname_of(&self, user: UserId) -> Option<String> {
        self.state.lock().unwrap().nicknames.get(&user).cloned()
    }

    pub fn deny_sends_to(&self, channel: ChannelId) {
        self.state.lock().unwrap().deny_sends.insert(channel);
    }

    pub fn deny_delete(&self, id: MessageId) {
        self.state.lock().unwrap().deny_delete.insert(id);
    }

    pub fn deny_role_changes(&self, deny: bool) {
        self.state.lock().unwrap().deny_roles = deny;
    }

    pub fn deny_nicknames(&self, deny: bool) {
        self.state.lock().unwrap().deny_nicknames = deny;
    }

    /// Stall the next `member` lookup of `user` for `delay`.
    pub fn delay_member_once(&self, user: UserId, delay: Duration) {
        self.state.lock().unwrap().member_delays.insert(user, delay);
    }

    /// Stall every `send_message` for `delay` before it takes effect.
    pub fn delay_sends(&self, delay: Duration) {
        self.state.lock().unwrap().send_delay = Some(delay);
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn send_message(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, PlatformError> {
        let delay = self.state.lock().unwrap().send_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.deny_sends.contains(&channel) {
            return Err(PlatformError::Forbidden);
        }
        state.next_id += 1;
        let id = MessageId(100_000 + state.next_id);
        state.live.insert((channel, id), message.clone());
        state.sent.push((channel, id, message.clone()));
        state.history.entry(channel).or_default().push(ChannelMessage {
            id,
            author: TestBot::SELF_ID,
            from_self: true,
            attachment_names: message
                .attachment
                .iter()
                .map(|a| a.filename.clone())
                .collect(),
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        update: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        match state.live.get_mut(&(channel, message)) {
            Some(current) => *current = update.clone(),
            None => return Err(PlatformError::NotFound),
        }
        state.edits.push((channel, message, update.clone()));
        Ok(())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        if state.deny_delete.contains(&message) {
            return Err(PlatformError::Forbidden);
        }
        let was_live = state.live.remove(&(channel, message)).is_some();
        let history = state.history.entry(channel).or_default();
        let before = history.len();
        history.retain(|m| m.id != message);
        if !was_live && history.len() == before {
            return Err(PlatformError::NotFound);
        }
        state.deleted.push((channel, message));
        Ok(())
    }

    async fn recent_messages(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>, PlatformError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .history
            .get(&channel)
            .map(|h| h.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn member(&self, _guild: GuildId, user: UserId) -> Result<Option<Member>, PlatformError> {
        let delay = self.state.lock().unwrap().member_delays.remove(&user);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        Ok(state.members.get(&user).map(|name| Member {
            user,
            display_name: name.clone(),
            roles: state.member_roles.get(&user).cloned().unwrap_or_default(),
        }))
    }

    async fn role_by_name(
        &self,
        _guild: GuildId,
        name: &str,
    ) -> Result<Option<RoleId>, PlatformError> {
        Ok(self.state.lock().unwrap().roles.get(name).copied())
    }

    async fn add_role(
        &self,
        _guild: GuildId,
        user: UserId,
        role: RoleId,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        if state.deny_roles {
            return Err(PlatformError::Forbidden);
        }
        state.member_roles.entry(user).or_default().push(role);
        Ok(())
    }

    async fn remove_role(
        &self,
        _guild: GuildId,
        user: UserId,
        role: RoleId,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        if state.deny_roles {
            return Err(PlatformError::Forbidden);
        }
        state.member_roles.entry(user).or_default().retain(|r| *r != role);
        Ok(())
    }

    async fn set_nickname(
        &self,
        _guild: GuildId,
        user: UserId,
        nickname: Option<&str>,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        if state.deny_nicknames {
            return Err(PlatformError::Forbidden);
        }
        match nickname {
            Some(nick) => state.nicknames.insert(user, nick.to_string()),
            None => state.nicknames.remove(&user),
        };
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeGameData
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GameDataState {
    rosters: VecDeque<Result<Vec<GuildMember>, GameDataError>>,
    roster_calls: usize,
    players: HashMap<String, PlayerSummary>,
    search_calls: usize,
    fail_searches: bool,
}

#[derive(Default)]
pub struct FakeGameData {
    state: Mutex<GameDataState>,
}

impl FakeGameData {
    /// Queue the result of the next roster fetch.
    pub fn push_roster(&self, result: Result<Vec<GuildMember>, String>) {
        let result = result.map_err(GameDataError::Unavailable);
        self.state.lock().unwrap().rosters.push_back(result);
    }

    /// Queue a roster response whose body cannot be decoded.
    pub fn push_roster_malformed(&self) {
        let error = serde_json::from_str::<Vec<GuildMember>>("<html>")
            .map(|_| Vec::new())
            .map_err(|e| GameDataError::Client(ClientError::Json(e)));
        self.state.lock().unwrap().rosters.push_back(error);
    }

    pub fn push_roster_failure(&self) {
        self.push_roster(Err("upstream timeout".to_string()));
    }

    pub fn roster_calls(&self) -> usize {
        self.state.lock().unwrap().roster_calls
    }

    pub fn add_player(&self, player: PlayerSummary) {
        let mut state = self.state.lock().unwrap();
        state.players.insert(player.name.to_lowercase(), player);
    }

    pub fn fail_searches(&self, fail: bool) {
        self.state.lock().unwrap().fail_searches = fail;
    }

    pub fn search_calls(&self) -> usize {
        self.state.lock().unwrap().search_calls
    }
}

#[async_trait]
impl GameDataSource for FakeGameData {
    async fn guild_members(&self) -> Result<Vec<GuildMember>, GameDataError> {
        let mut state = self.state.lock().unwrap();
        state.roster_calls += 1;
        match state.rosters.pop_front() {
            Some(result) => result,
            None => Err(GameDataError::Unavailable("no roster queued".to_string())),
        }
    }

    async fn find_player(&self, name: &str) -> Result<Option<PlayerSummary>, GameDataError> {
        let mut state = self.state.lock().unwrap();
        state.search_calls += 1;
        if state.fail_searches {
            return Err(GameDataError::Unavailable("search timed out".to_string()));
        }
        Ok(state.players.get(&name.to_lowercase()).cloned())
    }
}
