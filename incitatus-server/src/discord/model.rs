//! Wire types of the Discord v10 API, limited to the fields the bot reads,
//! and the JSON bodies it sends.

use incitatus_core::platform::{Button, ButtonStyle, Embed, OutgoingMessage};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

/// A Discord id. Sent as a string, occasionally as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Snowflake(pub u64);

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Snowflake(n)),
            Raw::Text(s) => s.parse().map(Snowflake).map_err(de::Error::custom),
        }
    }
}

pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// GUILDS | GUILD_MEMBERS | GUILD_MESSAGES
pub const INTENTS: u64 = (1 << 0) | (1 << 1) | (1 << 9);

/// Permission bits checked on interaction callers.
pub const ADMINISTRATOR: u64 = 1 << 3;
pub const MANAGE_GUILD: u64 = 1 << 5;

/// Interaction response flag for replies only the caller can see.
pub const EPHEMERAL: u64 = 1 << 6;

#[derive(Debug, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    pub s: Option<u64>,
    pub t: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
pub struct Ready {
    pub user: User,
    pub application: PartialApplication,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
}

#[derive(Debug, Deserialize)]
pub struct PartialApplication {
    pub id: Snowflake,
}

#[derive(Debug, Deserialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    pub global_name: Option<String>,
}

impl User {
    pub fn name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuildMember {
    pub user: Option<User>,
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    /// Only present on interaction payloads.
    pub permissions: Option<String>,
}

impl GuildMember {
    /// Server nickname, else global name, else username.
    pub fn display_name(&self) -> Option<String> {
        self.nick
            .clone()
            .or_else(|| self.user.as_ref().map(|u| u.name().to_string()))
    }

    pub fn permission_bits(&self) -> u64 {
        self.permissions
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct Role {
    pub id: Snowflake,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub author: User,
    #[serde(default)]
    pub attachments: Vec<MessageAttachment>,
}

#[derive(Debug, Deserialize)]
pub struct MessageAttachment {
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct Interaction {
    pub id: Snowflake,
    pub application_id: Snowflake,
    #[serde(rename = "type")]
    pub kind: u8,
    pub token: String,
    pub guild_id: Option<Snowflake>,
    pub channel_id: Option<Snowflake>,
    pub member: Option<GuildMember>,
    pub data: Option<InteractionData>,
}

impl Interaction {
    pub const APPLICATION_COMMAND: u8 = 2;
    pub const MESSAGE_COMPONENT: u8 = 3;
}

#[derive(Debug, Default, Deserialize)]
pub struct InteractionData {
    pub name: Option<String>,
    pub custom_id: Option<String>,
    #[serde(default)]
    pub options: Vec<CommandOption>,
    #[serde(default)]
    pub resolved: Resolved,
}

#[derive(Debug, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub value: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Resolved {
    #[serde(default)]
    pub users: HashMap<String, User>,
    #[serde(default)]
    pub members: HashMap<String, GuildMember>,
}

impl Resolved {
    /// Display name of a user passed as a command option.
    pub fn display_name(&self, id: u64) -> Option<String> {
        let key = id.to_string();
        let nick = self.members.get(&key).and_then(|m| m.nick.clone());
        nick.or_else(|| self.users.get(&key).map(|u| u.name().to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    pub retry_after: Option<f64>,
}

fn style_code(style: ButtonStyle) -> u8 {
    match style {
        ButtonStyle::Primary => 1,
        ButtonStyle::Secondary => 2,
        ButtonStyle::Success => 3,
        ButtonStyle::Danger => 4,
    }
}

fn embed_json(embed: &Embed) -> Value {
    let fields: Vec<Value> = embed
        .fields
        .iter()
        .map(|f| json!({ "name": f.name, "value": f.value, "inline": f.inline }))
        .collect();
    let mut body = json!({
        "title": embed.title,
        "description": embed.description,
        "color": embed.color,
        "fields": fields,
    });
    if let Some(footer) = &embed.footer {
        body["footer"] = json!({ "text": footer });
    }
    body
}

fn button_json(button: &Button) -> Value {
    let mut body = json!({
        "type": 2,
        "style": style_code(button.style),
        "label": button.label,
        "custom_id": button.custom_id,
        "disabled": button.disabled,
    });
    if let Some(emoji) = &button.emoji {
        body["emoji"] = json!({ "name": emoji });
    }
    body
}

/// Message body for create and edit. Editing with this body replaces
/// content, embeds and components as a whole.
pub fn message_body(message: &OutgoingMessage) -> Value {
    let embeds: Vec<Value> = message.embed.iter().map(embed_json).collect();
    let components: Vec<Value> = message
        .buttons
        .chunks(5)
        .map(|row| json!({ "type": 1, "components": row.iter().map(button_json).collect::<Vec<_>>() }))
        .collect();
    let mut body = json!({
        "content": message.content.clone().unwrap_or_default(),
        "embeds": embeds,
        "components": components,
    });
    if let Some(attachment) = &message.attachment {
        body["attachments"] = json!([{ "id": 0, "filename": attachment.filename }]);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflakes_accept_strings_and_numbers() {
        let ids: Vec<Snowflake> = serde_json::from_str(r#"["123", 456]"#).unwrap();
        assert_eq!(ids, vec![Snowflake(123), Snowflake(456)]);
    }

    #[test]
    fn interaction_with_member_permissions() {
        let raw = r#"{
            "id": "10", "application_id": "20", "type": 2, "token": "tok",
            "guild_id": "1", "channel_id": "5",
            "member": {
                "user": {"id": "7", "username": "crassus", "global_name": null},
                "nick": "Marcus", "roles": ["99"], "permissions": "32"
            },
            "data": {"name": "balance", "options": [{"name": "user", "type": 6, "value": "8"}],
                     "resolved": {"users": {"8": {"id": "8", "username": "gaius", "global_name": "Gaius"}}}}
        }"#;
        let interaction: Interaction = serde_json::from_str(raw).unwrap();
        let member = interaction.member.unwrap();
        assert_eq!(member.display_name().as_deref(), Some("Marcus"));
        assert_eq!(member.permission_bits() & MANAGE_GUILD, MANAGE_GUILD);
        let data = interaction.data.unwrap();
        assert_eq!(data.resolved.display_name(8).as_deref(), Some("Gaius"));
    }

    #[test]
    fn buttons_are_grouped_into_rows() {
        let buttons = (0..6)
            .map(|i| Button {
                custom_id: format!("b{i}"),
                label: "x".into(),
                emoji: None,
                style: ButtonStyle::Danger,
                disabled: false,
            })
            .collect();
        let body = message_body(&OutgoingMessage::text("hi").with_buttons(buttons));
        let rows = body["components"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["components"][0]["style"], 4);
        assert_eq!(body["content"], "hi");
    }

    #[test]
    fn embed_footer_and_attachment() {
        let message = OutgoingMessage {
            embed: Some(Embed::titled("t", 0x3498db).footer("f")),
            ..OutgoingMessage::file("log", "evento_3.txt", b"x".to_vec())
        };
        let body = message_body(&message);
        assert_eq!(body["embeds"][0]["footer"]["text"], "f");
        assert_eq!(body["attachments"][0]["filename"], "evento_3.txt");
    }
}
