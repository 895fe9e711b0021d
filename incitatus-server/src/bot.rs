//! Routes gateway events to the command table, the button table and the
//! processors.

use crate::commands::{
    ButtonTable, CommandTable, FollowUp, Invocation, Reply, definitions, handle,
};
use crate::discord::model::{
    ADMINISTRATOR, GuildMember, Interaction, InteractionData, MANAGE_GUILD, Message, Ready,
};
use crate::discord::rest::DiscordRest;
use crate::state::AppState;
use incitatus_core::BotContext;
use incitatus_core::ids::{ChannelId, GuildId, RoleId, UserId};
use incitatus_core::platform::{Caller, Member};
use incitatus_core::processors::event_machine::{EventMachine, Transition};
use incitatus_core::processors::roster_sync::RosterSync;
use incitatus_core::processors::surfaces::SurfaceReconciler;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct Bot {
    ctx: BotContext,
    rest: Arc<DiscordRest>,
    commands: CommandTable,
    buttons: ButtonTable,
    state: AppState,
    roster_started: AtomicBool,
    shutdown_rx: watch::Receiver<bool>,
}

impl Bot {
    pub fn new(
        ctx: BotContext,
        rest: Arc<DiscordRest>,
        state: AppState,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            rest,
            commands: CommandTable::new(),
            buttons: ButtonTable::new(),
            state,
            roster_started: AtomicBool::new(false),
            shutdown_rx,
        }
    }

    fn in_our_guild(&self, guild: Option<u64>) -> bool {
        guild == Some(self.ctx.guild.0)
    }

    /// Register commands, reconcile every surface and start the roster
    /// loop. READY arrives again after every reconnect; the loop is only
    /// started once.
    pub async fn on_ready(&self, ready: Ready) {
        self.rest.set_self_id(UserId(ready.user.id.0));
        if !ready.guilds.iter().any(|g| g.id.0 == self.ctx.guild.0) {
            warn!(guild = %self.ctx.guild, "Bot is not a member of the configured guild");
        }

        if let Err(e) = self
            .rest
            .register_commands(
                ready.application.id,
                self.ctx.guild,
                &definitions::application_commands(),
            )
            .await
        {
            error!(error = %e, "Failed to register application commands");
        }

        SurfaceReconciler::new(&self.ctx).refresh_all().await;

        if !self.roster_started.swap(true, Ordering::AcqRel) {
            let roster = RosterSync::new(self.ctx.clone());
            tokio::spawn(roster.run(self.shutdown_rx.clone()));
        }

        self.state.set_ready(true);
        info!("Bot online como {}", ready.user.name());
    }

    /// A guild message was posted; only the cleanup scheduler cares.
    pub async fn on_message(&self, message: Message) {
        if !self.in_our_guild(message.guild_id.map(|g| g.0)) {
            return;
        }
        let from_self = Some(UserId(message.author.id.0)) == self.rest.self_id();
        let channel = ChannelId(message.channel_id.0);
        if self.ctx.cleanup.observe(channel, from_self).await {
            debug!(%channel, "Register channel purge scheduled");
        }
    }

    pub async fn on_interaction(&self, interaction: Interaction) {
        if !self.in_our_guild(interaction.guild_id.map(|g| g.0)) {
            debug!("Ignoring interaction outside the configured guild");
            return;
        }
        let Some(member) = &interaction.member else {
            return;
        };
        let Some(caller) = self.caller(member).await else {
            return;
        };
        let data = interaction.data.as_ref();

        match interaction.kind {
            Interaction::APPLICATION_COMMAND => {
                if let Some(data) = data {
                    self.on_command(&interaction, data, &caller).await;
                }
            }
            Interaction::MESSAGE_COMPONENT => {
                if let Some(custom_id) = data.and_then(|d| d.custom_id.as_deref()) {
                    self.on_button(&interaction, custom_id, &caller).await;
                }
            }
            other => debug!(kind = other, "Ignoring interaction type"),
        }
    }

    async fn caller(&self, member: &GuildMember) -> Option<Caller> {
        let user = UserId(member.user.as_ref()?.id.0);
        let display_name = member.display_name().unwrap_or_else(|| format!("<{user}>"));
        let role_ids: Vec<RoleId> = member.roles.iter().map(|r| RoleId(r.0)).collect();
        let role_names = match self.rest.role_names(self.ctx.guild, &role_ids).await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Could not resolve caller role names");
                Vec::new()
            }
        };
        self.rest
            .remember_member(
                self.ctx.guild,
                Member {
                    user,
                    display_name: display_name.clone(),
                    roles: role_ids.clone(),
                },
            )
            .await;
        let permissions = member.permission_bits();
        Some(Caller {
            user,
            display_name,
            manage_guild: permissions & (MANAGE_GUILD | ADMINISTRATOR) != 0,
            role_ids,
            role_names,
        })
    }

    async fn on_command(&self, interaction: &Interaction, data: &InteractionData, caller: &Caller) {
        let name = data.name.as_deref().unwrap_or_default();
        let Some(command) = self.commands.lookup(name) else {
            warn!(command = name, "Unknown command");
            return;
        };
        let Some(channel) = interaction.channel_id.map(|c| ChannelId(c.0)) else {
            return;
        };
        let invocation = Invocation {
            caller,
            channel,
            options: &data.options,
            resolved: &data.resolved,
        };
        debug!(command = name, user = %caller.user, "Dispatching command");

        let reply = if command.deferred() {
            if let Err(e) = self.rest.defer(interaction.id, &interaction.token, true).await {
                warn!(error = %e, command = name, "Failed to defer interaction");
                return;
            }
            let reply = handle(&self.ctx, command, &invocation).await;
            if let Err(e) = self
                .rest
                .edit_original(interaction.application_id, &interaction.token, &reply.content)
                .await
            {
                warn!(error = %e, command = name, "Failed to send deferred reply");
            }
            reply
        } else {
            let reply = handle(&self.ctx, command, &invocation).await;
            self.send_reply(interaction, name, &reply).await;
            reply
        };

        if let Some(FollowUp::RefreshFor(role)) = reply.follow_up {
            SurfaceReconciler::new(&self.ctx)
                .refresh_for_role(role)
                .await;
        }
    }

    async fn send_reply(&self, interaction: &Interaction, command: &str, reply: &Reply) {
        if let Err(e) = self
            .rest
            .reply(
                interaction.id,
                &interaction.token,
                &reply.content,
                reply.ephemeral,
            )
            .await
        {
            warn!(error = %e, command, "Failed to reply to interaction");
        }
    }

    async fn on_button(&self, interaction: &Interaction, custom_id: &str, caller: &Caller) {
        let Some((surface, action)) = self.buttons.lookup(custom_id) else {
            debug!(custom_id, "Unknown button");
            return;
        };
        if let Err(e) = self
            .rest
            .acknowledge_component(interaction.id, &interaction.token)
            .await
        {
            warn!(error = %e, custom_id, "Failed to acknowledge button");
        }
        match EventMachine::new(&self.ctx).apply(action, caller).await {
            Ok(Transition::Applied { event_id }) => {
                debug!(%surface, ?action, event_id, "Panel action applied");
            }
            Ok(Transition::Ignored) => debug!(%surface, ?action, "Panel action ignored"),
            Err(e) => error!(error = %e, ?action, "Panel action failed to persist"),
        }
    }
}

/// The guild to operate in: the configured one, else the first guild the
/// bot belongs to.
pub async fn resolve_guild(
    rest: &DiscordRest,
    configured: Option<u64>,
) -> anyhow::Result<GuildId> {
    if let Some(id) = configured {
        return Ok(GuildId(id));
    }
    rest.first_guild()
        .await?
        .ok_or_else(|| anyhow::anyhow!("the bot is not a member of any guild"))
}
