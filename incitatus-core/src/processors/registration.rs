//! RegistrationArbiter processor.
//!
//! The RegistrationArbiter is responsible for:
//! - Rate limiting registration attempts per user
//! - Keeping nickname bindings one-to-one
//! - Validating the player and their guild against the game data
//! - Granting the registered role and renaming the member
//! - Undoing all of the above on unregister

use crate::context::BotContext;
use crate::entities::{BindOutcome, BindRegistration, FindRegistration, ReleaseRegistration};
use crate::framework::StoreError;
use crate::game_data::GameDataError;
use crate::ids::{ChannelId, RoleId};
use crate::platform::{Caller, PlatformError};
use kanau::processor::Processor;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Shown as the guild tag when the player's guild has no name.
const MISSING_TAG: &str = "-----";
const TAG_LEN: usize = 5;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("registration on cooldown for {0:?}")]
    Cooldown(Duration),

    #[error("registration is only accepted in channel {0}")]
    WrongChannel(ChannelId),

    #[error("user is already registered")]
    AlreadyRegistered,

    #[error("nickname is registered to another member")]
    NicknameTaken,

    #[error("player not found")]
    PlayerNotFound,

    #[error("player is not in a guild")]
    NoGuild,

    #[error("guild {guild_name} is not part of the alliance")]
    UnauthorizedGuild { guild_name: String },

    #[error("player lookup unavailable: {0}")]
    LookupUnavailable(#[source] GameDataError),

    #[error("could not grant the registered role: {0}")]
    RoleGrantFailed(#[source] PlatformError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum UnregisterError {
    #[error("user is not registered")]
    NotRegistered,

    #[error("could not revoke the registered role: {0}")]
    RoleRevokeFailed(#[source] PlatformError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered {
        /// In-game name as spelled by the game data.
        player_name: String,
        /// The `[TAG] Name` nickname that was applied or attempted.
        nickname: String,
        /// Whether the member's nickname could be changed.
        renamed: bool,
    },
    /// The nickname was already bound to this user; nothing changed.
    AlreadyBound,
}

pub struct RegistrationArbiter<'a> {
    ctx: &'a BotContext,
}

impl<'a> RegistrationArbiter<'a> {
    pub fn new(ctx: &'a BotContext) -> Self {
        Self { ctx }
    }

    /// Bind `nickname` to `caller`, invoked from `channel`.
    ///
    /// The binding is recorded before the role is granted and released
    /// again if the grant fails, so a failed registration leaves nothing
    /// behind.
    #[tracing::instrument(skip_all, err, name = "Registration:register", fields(user = %caller.user))]
    pub async fn register(
        &self,
        caller: &Caller,
        channel: ChannelId,
        nickname: &str,
    ) -> Result<RegisterOutcome, RegistrationError> {
        self.ctx
            .register_cooldown
            .try_acquire(caller.user)
            .await
            .map_err(RegistrationError::Cooldown)?;

        let expected = self.ctx.config.read().await.register_channel;
        if let Some(expected) = expected.filter(|expected| *expected != channel) {
            return Err(RegistrationError::WrongChannel(expected));
        }

        let role = self.registered_role().await?;
        if role.is_some_and(|role| caller.has_role(role)) {
            return Err(RegistrationError::AlreadyRegistered);
        }

        let lookup = nickname.trim();
        match self
            .ctx
            .ledgers
            .process(FindRegistration {
                nickname: lookup.to_string(),
            })
            .await?
        {
            Some(owner) if owner == caller.user => return Ok(RegisterOutcome::AlreadyBound),
            Some(_) => return Err(RegistrationError::NicknameTaken),
            None => {}
        }

        let player = self
            .ctx
            .game_data
            .find_player(lookup)
            .await
            .map_err(RegistrationError::LookupUnavailable)?
            .ok_or(RegistrationError::PlayerNotFound)?;
        let guild_name = player.guild_name().unwrap_or(MISSING_TAG).to_string();
        let Some(guild_id) = player.guild_id() else {
            return Err(RegistrationError::NoGuild);
        };
        if !self.ctx.ledgers.ledgers.alliance().contains(guild_id) {
            return Err(RegistrationError::UnauthorizedGuild { guild_name });
        }

        // availability may have changed while the lookup was in flight
        match self
            .ctx
            .ledgers
            .process(BindRegistration {
                nickname: lookup.to_string(),
                user: caller.user,
            })
            .await?
        {
            BindOutcome::Bound => {}
            BindOutcome::AlreadyHeld => return Ok(RegisterOutcome::AlreadyBound),
            BindOutcome::TakenBy(_) => return Err(RegistrationError::NicknameTaken),
        }

        if let Some(role) = role {
            let granted = self
                .ctx
                .platform
                .add_role(self.ctx.guild, caller.user, role)
                .await;
            if let Err(e) = granted {
                warn!(error = %e, "Failed to grant registered role, releasing binding");
                self.ctx
                    .ledgers
                    .process(ReleaseRegistration { user: caller.user })
                    .await?;
                return Err(RegistrationError::RoleGrantFailed(e));
            }
        }

        let nickname = tagged_nickname(&guild_name, &player.name);
        let renamed = match self
            .ctx
            .platform
            .set_nickname(self.ctx.guild, caller.user, Some(&nickname))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Could not change member nickname");
                false
            }
        };

        info!(player = %player.name, guild = %guild_name, "Member registered");
        Ok(RegisterOutcome::Registered {
            player_name: player.name,
            nickname,
            renamed,
        })
    }

    /// Remove `caller`'s binding and registered role.
    ///
    /// Returns the nickname that was released, if any.
    #[tracing::instrument(skip_all, err, name = "Registration:unregister", fields(user = %caller.user))]
    pub async fn unregister(&self, caller: &Caller) -> Result<Option<String>, UnregisterError> {
        let Some(role) = self.registered_role().await? else {
            return Err(UnregisterError::NotRegistered);
        };
        if !caller.has_role(role) {
            return Err(UnregisterError::NotRegistered);
        }

        let released = self
            .ctx
            .ledgers
            .process(ReleaseRegistration { user: caller.user })
            .await?;

        self.ctx
            .platform
            .remove_role(self.ctx.guild, caller.user, role)
            .await
            .map_err(UnregisterError::RoleRevokeFailed)?;

        if let Err(e) = self
            .ctx
            .platform
            .set_nickname(self.ctx.guild, caller.user, None)
            .await
        {
            debug!(error = %e, "Could not clear member nickname");
        }

        info!(nickname = ?released, "Member unregistered");
        Ok(released)
    }

    async fn registered_role(&self) -> Result<Option<RoleId>, PlatformError> {
        self.ctx
            .platform
            .role_by_name(self.ctx.guild, &self.ctx.settings.registered_role)
            .await
    }
}

/// `[TAG] Name`, where TAG is the first five characters of the uppercased
/// guild name.
pub fn tagged_nickname(guild_name: &str, player_name: &str) -> String {
    let tag: String = guild_name.to_uppercase().chars().take(TAG_LEN).collect();
    format!("[{tag}] {player_name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelRole;
    use crate::ids::UserId;
    use crate::testing::{TestBot, ALLIED_GUILD, member, player};

    const CHANNEL: ChannelId = ChannelId(500);

    async fn bot_with_role() -> (TestBot, RoleId) {
        let bot = TestBot::new().await;
        let role = bot.platform.add_role_named("Plebs");
        (bot, role)
    }

    #[test]
    fn nickname_tags() {
        assert_eq!(tagged_nickname("Legio Decima", "Brutus"), "[LEGIO] Brutus");
        assert_eq!(tagged_nickname("SPQR", "Brutus"), "[SPQR] Brutus");
        assert_eq!(tagged_nickname(MISSING_TAG, "Brutus"), "[-----] Brutus");
    }

    #[tokio::test]
    async fn registers_an_allied_player() {
        let (bot, role) = bot_with_role().await;
        bot.game_data
            .add_player(player("Brutus", Some(ALLIED_GUILD), Some("Legio Decima")));

        let outcome = RegistrationArbiter::new(&bot.ctx)
            .register(&member(1), CHANNEL, "brutus")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RegisterOutcome::Registered {
                player_name: "Brutus".into(),
                nickname: "[LEGIO] Brutus".into(),
                renamed: true,
            }
        );
        assert!(bot.platform.roles_of(UserId(1)).contains(&role));
        assert_eq!(bot.platform.nickname_of(UserId(1)).as_deref(), Some("[LEGIO] Brutus"));
        let owner = bot
            .ctx
            .ledgers
            .process(FindRegistration {
                nickname: "BRUTUS".into(),
            })
            .await
            .unwrap();
        assert_eq!(owner, Some(UserId(1)));
    }

    #[tokio::test]
    async fn conflicting_and_repeated_registrations() {
        let (bot, _) = bot_with_role().await;
        bot.game_data
            .add_player(player("Foo", Some(ALLIED_GUILD), Some("Roma")));
        let arbiter = RegistrationArbiter::new(&bot.ctx);

        arbiter.register(&member(1), CHANNEL, "Foo").await.unwrap();

        let taken = arbiter.register(&member(2), CHANNEL, "foo").await;
        assert!(matches!(taken, Err(RegistrationError::NicknameTaken)));

        // user 1 without the role (e.g. removed by a moderator) re-registering
        let again = arbiter.register(&member(1), CHANNEL, "Foo").await.unwrap();
        assert_eq!(again, RegisterOutcome::AlreadyBound);
    }

    #[tokio::test]
    async fn role_holder_is_rejected_without_lookup() {
        let (bot, role) = bot_with_role().await;
        let mut caller = member(1);
        caller.role_ids.push(role);

        let result = RegistrationArbiter::new(&bot.ctx)
            .register(&caller, CHANNEL, "Brutus")
            .await;
        assert!(matches!(result, Err(RegistrationError::AlreadyRegistered)));
        assert_eq!(bot.game_data.search_calls(), 0);
    }

    #[tokio::test]
    async fn lookup_failures_are_distinguished() {
        let (bot, _) = bot_with_role().await;
        let arbiter = RegistrationArbiter::new(&bot.ctx);

        let missing = arbiter.register(&member(1), CHANNEL, "Nobody").await;
        assert!(matches!(missing, Err(RegistrationError::PlayerNotFound)));

        bot.game_data.fail_searches(true);
        let down = arbiter.register(&member(2), CHANNEL, "Nobody").await;
        assert!(matches!(down, Err(RegistrationError::LookupUnavailable(_))));
    }

    #[tokio::test]
    async fn guild_checks() {
        let (bot, _) = bot_with_role().await;
        bot.game_data.add_player(player("Loner", None, None));
        bot.game_data
            .add_player(player("Gaul", Some("enemy-guild"), Some("Arverni")));
        let arbiter = RegistrationArbiter::new(&bot.ctx);

        let loner = arbiter.register(&member(1), CHANNEL, "Loner").await;
        assert!(matches!(loner, Err(RegistrationError::NoGuild)));

        let gaul = arbiter.register(&member(2), CHANNEL, "Gaul").await;
        match gaul {
            Err(RegistrationError::UnauthorizedGuild { guild_name }) => {
                assert_eq!(guild_name, "Arverni")
            }
            other => panic!("unexpected {other:?}"),
        }
        let owner = bot
            .ctx
            .ledgers
            .process(FindRegistration {
                nickname: "gaul".into(),
            })
            .await
            .unwrap();
        assert_eq!(owner, None);
    }

    #[tokio::test]
    async fn role_grant_failure_releases_binding() {
        let (bot, _) = bot_with_role().await;
        bot.game_data
            .add_player(player("Brutus", Some(ALLIED_GUILD), Some("Roma")));
        bot.platform.deny_role_changes(true);

        let result = RegistrationArbiter::new(&bot.ctx)
            .register(&member(1), CHANNEL, "Brutus")
            .await;

        assert!(matches!(result, Err(RegistrationError::RoleGrantFailed(_))));
        let owner = bot
            .ctx
            .ledgers
            .process(FindRegistration {
                nickname: "brutus".into(),
            })
            .await
            .unwrap();
        assert_eq!(owner, None);
    }

    #[tokio::test]
    async fn rename_failure_still_registers() {
        let (bot, _) = bot_with_role().await;
        bot.game_data
            .add_player(player("Brutus", Some(ALLIED_GUILD), None));
        bot.platform.deny_nicknames(true);

        let outcome = RegistrationArbiter::new(&bot.ctx)
            .register(&member(1), CHANNEL, "Brutus")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RegisterOutcome::Registered {
                player_name: "Brutus".into(),
                nickname: "[-----] Brutus".into(),
                renamed: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_and_channel_checks() {
        let (bot, _) = bot_with_role().await;
        bot.bind(ChannelRole::Register, CHANNEL).await;
        let arbiter = RegistrationArbiter::new(&bot.ctx);

        let elsewhere = arbiter.register(&member(1), ChannelId(1), "Brutus").await;
        assert!(matches!(elsewhere, Err(RegistrationError::WrongChannel(CHANNEL))));
        let _ = arbiter.register(&member(1), CHANNEL, "Brutus").await;

        let limited = arbiter.register(&member(1), CHANNEL, "Brutus").await;
        assert!(matches!(limited, Err(RegistrationError::Cooldown(_))));
    }

    #[tokio::test]
    async fn unregister_round_trip() {
        let (bot, role) = bot_with_role().await;
        bot.game_data
            .add_player(player("Brutus", Some(ALLIED_GUILD), Some("Roma")));
        let arbiter = RegistrationArbiter::new(&bot.ctx);

        let not_yet = arbiter.unregister(&member(1)).await;
        assert!(matches!(not_yet, Err(UnregisterError::NotRegistered)));

        arbiter.register(&member(1), CHANNEL, "Brutus").await.unwrap();
        let mut registered = member(1);
        registered.role_ids.push(role);

        let released = arbiter.unregister(&registered).await.unwrap();
        assert_eq!(released.as_deref(), Some("brutus"));
        assert!(!bot.platform.roles_of(UserId(1)).contains(&role));
        assert_eq!(bot.platform.nickname_of(UserId(1)), None);
    }

    #[tokio::test]
    async fn unregister_reports_role_permission_failure() {
        let (bot, role) = bot_with_role().await;
        bot.platform.deny_role_changes(true);
        let mut registered = member(1);
        registered.role_ids.push(role);

        let result = RegistrationArbiter::new(&bot.ctx).unregister(&registered).await;
        assert!(matches!(result, Err(UnregisterError::RoleRevokeFailed(PlatformError::Forbidden))));
    }
}
