//! Slash command and button dispatch.
//!
//! Commands are looked up by name in a [`CommandTable`]; buttons by custom
//! id in a [`ButtonTable`] keyed to `(Surface, PanelAction)`. Both tables
//! are built once at startup.

pub mod definitions;
mod handlers;

pub use handlers::handle;

use crate::discord::model::{CommandOption, Resolved};
use incitatus_core::config::{ChannelBindingTable, ChannelRole, Surface};
use incitatus_core::ids::{ChannelId, UserId};
use incitatus_core::platform::Caller;
use incitatus_core::processors::event_machine::PanelAction;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    BindChannel(ChannelRole),
    SplitLoot,
    Balance,
    Pay,
    Register,
    Unregister,
}

impl Command {
    /// Commands whose work may outlast the interaction acknowledgement
    /// window are deferred and answered afterwards.
    pub fn deferred(self) -> bool {
        matches!(self, Command::Register)
    }
}

pub struct CommandTable {
    bindings: ChannelBindingTable,
    fixed: HashMap<&'static str, Command>,
}

impl CommandTable {
    pub fn new() -> Self {
        let fixed = [
            ("split-loot", Command::SplitLoot),
            ("balance", Command::Balance),
            ("pay", Command::Pay),
            ("register", Command::Register),
            ("unregister", Command::Unregister),
        ]
        .into_iter()
        .collect();
        Self {
            bindings: ChannelBindingTable::new(),
            fixed,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Command> {
        self.fixed
            .get(name)
            .copied()
            .or_else(|| self.bindings.lookup(name).map(Command::BindChannel))
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ButtonTable {
    by_custom_id: HashMap<&'static str, (Surface, PanelAction)>,
}

impl ButtonTable {
    pub fn new() -> Self {
        Self {
            by_custom_id: PanelAction::ALL
                .into_iter()
                .map(|action| (action.custom_id(), (action.surface(), action)))
                .collect(),
        }
    }

    pub fn lookup(&self, custom_id: &str) -> Option<(Surface, PanelAction)> {
        self.by_custom_id.get(custom_id).copied()
    }
}

impl Default for ButtonTable {
    fn default() -> Self {
        Self::new()
    }
}

/// One slash command call.
pub struct Invocation<'a> {
    pub caller: &'a Caller,
    pub channel: ChannelId,
    pub options: &'a [CommandOption],
    pub resolved: &'a Resolved,
}

impl Invocation<'_> {
    fn option(&self, name: &str) -> Option<&Value> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.value.as_ref())
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.option(name).and_then(Value::as_str)
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.option(name).and_then(Value::as_i64)
    }

    fn snowflake(&self, name: &str) -> Option<u64> {
        match self.option(name)? {
            Value::String(s) => s.parse().ok(),
            other => other.as_u64(),
        }
    }

    pub fn user(&self, name: &str) -> Option<UserId> {
        self.snowflake(name).map(UserId)
    }

    pub fn channel(&self, name: &str) -> Option<ChannelId> {
        self.snowflake(name).map(ChannelId)
    }
}

/// Work to run once the reply has been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    RefreshFor(ChannelRole),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub ephemeral: bool,
    pub follow_up: Option<FollowUp>,
}

impl Reply {
    pub fn private(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
            follow_up: None,
        }
    }

    pub fn public(content: impl Into<String>) -> Self {
        Self {
            ephemeral: false,
            ..Self::private(content)
        }
    }

    fn then(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = Some(follow_up);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_binding_command_resolves() {
        let table = CommandTable::new();
        for role in ChannelRole::ALL {
            assert_eq!(
                table.lookup(role.command_name()),
                Some(Command::BindChannel(role))
            );
        }
        assert_eq!(table.lookup("split-loot"), Some(Command::SplitLoot));
        assert_eq!(table.lookup("unknown"), None);
    }

    #[test]
    fn buttons_map_to_their_panel() {
        let table = ButtonTable::new();
        assert_eq!(
            table.lookup("join_evt"),
            Some((Surface::ParticipationPanel, PanelAction::Join))
        );
        assert_eq!(
            table.lookup("evt_cancel"),
            Some((Surface::EventPanel, PanelAction::Cancel))
        );
        assert_eq!(table.lookup("evt_unknown"), None);
    }

    #[test]
    fn options_parse_snowflakes_and_integers() {
        let options: Vec<CommandOption> = serde_json::from_str(
            r#"[{"name": "user", "type": 6, "value": "42"},
                {"name": "value", "type": 4, "value": 1500},
                {"name": "nickname", "type": 3, "value": "Crassus"}]"#,
        )
        .unwrap();
        let caller = Caller {
            user: UserId(1),
            display_name: "x".into(),
            manage_guild: false,
            role_ids: vec![],
            role_names: vec![],
        };
        let resolved = Resolved::default();
        let invocation = Invocation {
            caller: &caller,
            channel: ChannelId(9),
            options: &options,
            resolved: &resolved,
        };
        assert_eq!(invocation.user("user"), Some(UserId(42)));
        assert_eq!(invocation.integer("value"), Some(1500));
        assert_eq!(invocation.string("nickname"), Some("Crassus"));
        assert_eq!(invocation.integer("missing"), None);
    }
}
