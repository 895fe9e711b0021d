//! Application command definitions, registered with a bulk overwrite.

use crate::discord::model::MANAGE_GUILD;
use incitatus_core::config::ChannelRole;
use serde_json::{Value, json};

const STRING: u8 = 3;
const INTEGER: u8 = 4;
const USER: u8 = 6;
const CHANNEL: u8 = 7;
const GUILD_TEXT: u8 = 0;

fn bind_channel(role: ChannelRole) -> Value {
    json!({
        "name": role.command_name(),
        "description": format!("Define {}", role.label()),
        "default_member_permissions": MANAGE_GUILD.to_string(),
        "dm_permission": false,
        "options": [{
            "type": CHANNEL,
            "name": "channel",
            "description": "Canal",
            "required": true,
            "channel_types": [GUILD_TEXT],
        }],
    })
}

pub fn application_commands() -> Value {
    let mut commands: Vec<Value> = ChannelRole::ALL.into_iter().map(bind_channel).collect();
    commands.extend([
        json!({
            "name": "split-loot",
            "description": "Divide o loot entre os participantes do evento atual.",
            "dm_permission": false,
            "options": [
                { "type": INTEGER, "name": "total", "description": "Valor total (obrigatório, >0)",
                  "required": true, "min_value": 1 },
                { "type": INTEGER, "name": "tax", "description": "Taxa da guild (0-100%)",
                  "min_value": 0, "max_value": 100 },
                { "type": INTEGER, "name": "repair", "description": "Custos de reparo (>=0)",
                  "min_value": 0 },
            ],
        }),
        json!({
            "name": "balance",
            "description": "Exibe seu saldo ou o de outro jogador.",
            "options": [
                { "type": USER, "name": "user",
                  "description": "Jogador (mencione ou deixe em branco para você)" },
            ],
        }),
        json!({
            "name": "pay",
            "description": "Registra pagamento (reduz saldo) de um jogador.",
            "dm_permission": false,
            "options": [
                { "type": USER, "name": "user", "description": "Jogador", "required": true },
                { "type": INTEGER, "name": "value", "description": "Valor pago (inteiro >0)",
                  "required": true, "min_value": 1 },
            ],
        }),
        json!({
            "name": "register",
            "description": "Vincula seu nick do Albion e libera o acesso ao servidor.",
            "dm_permission": false,
            "options": [
                { "type": STRING, "name": "nickname",
                  "description": "Digite exatamente como aparece no jogo", "required": true },
            ],
        }),
        json!({
            "name": "unregister",
            "description": "Remove o registro.",
            "dm_permission": false,
        }),
    ]);
    Value::Array(commands)
}
