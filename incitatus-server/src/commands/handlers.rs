use super::{Command, FollowUp, Invocation, Reply};
use incitatus_core::BotContext;
use incitatus_core::config::ChannelRole;
use incitatus_core::entities::PaymentError;
use incitatus_core::ids::UserId;
use incitatus_core::platform::display_name;
use incitatus_core::processors::loot_split::{LootSplitter, SplitError, SplitRequest};
use incitatus_core::processors::registration::{
    RegisterOutcome, RegistrationArbiter, RegistrationError, UnregisterError,
};
use incitatus_core::processors::treasury::Treasury;
use incitatus_core::utils::format::{format_coin, format_seconds};
use tracing::error;

const NO_PERMISSION: &str = "❌ Você não tem permissão para usar este comando.";
const INTERNAL_ERROR: &str = "❌ Erro interno. Tente novamente mais tarde.";
const MISSING_OPTION: &str = "❌ Parâmetro obrigatório ausente.";

/// Run `command` for the invocation and produce the reply.
pub async fn handle(ctx: &BotContext, command: Command, invocation: &Invocation<'_>) -> Reply {
    match command {
        Command::BindChannel(role) => bind_channel(ctx, role, invocation).await,
        Command::SplitLoot => split_loot(ctx, invocation).await,
        Command::Balance => balance(ctx, invocation).await,
        Command::Pay => pay(ctx, invocation).await,
        Command::Register => register(ctx, invocation).await,
        Command::Unregister => unregister(ctx, invocation).await,
    }
}

async fn target_name(ctx: &BotContext, invocation: &Invocation<'_>, user: UserId) -> String {
    if user == invocation.caller.user {
        return invocation.caller.display_name.clone();
    }
    match invocation.resolved.display_name(user.0) {
        Some(name) => name,
        None => display_name(ctx.platform.as_ref(), ctx.guild, user).await,
    }
}

async fn bind_channel(ctx: &BotContext, role: ChannelRole, invocation: &Invocation<'_>) -> Reply {
    if !invocation.caller.manage_guild {
        return Reply::private(NO_PERMISSION);
    }
    let Some(channel) = invocation.channel("channel") else {
        return Reply::private(MISSING_OPTION);
    };
    if let Err(e) = ctx
        .config
        .update(|config| *role.slot(config) = Some(channel))
        .await
    {
        error!(error = %e, role = role.command_name(), "Failed to persist channel binding");
        return Reply::private(INTERNAL_ERROR);
    }
    tracing::info!(%channel, role = role.command_name(), "Channel bound");
    Reply::private(format!("{} definido: <#{channel}>", role.label()))
        .then(FollowUp::RefreshFor(role))
}

async fn split_loot(ctx: &BotContext, invocation: &Invocation<'_>) -> Reply {
    if !invocation.caller.is_admin(&ctx.settings.admin_role) {
        return Reply::private(NO_PERMISSION);
    }
    let repair = invocation.integer("repair").unwrap_or(0);
    let Ok(repair) = u64::try_from(repair) else {
        return Reply::private("❌ reparo ≥ 0");
    };
    let request = SplitRequest {
        total: invocation
            .integer("total")
            .and_then(|t| u64::try_from(t).ok())
            .unwrap_or(0),
        tax_percent: u32::try_from(invocation.integer("tax").unwrap_or(0)).unwrap_or(u32::MAX),
        repair,
    };
    match LootSplitter::new(ctx)
        .split(request, Some(invocation.channel))
        .await
    {
        Ok(_) => Reply::private("✅ Split registrado!"),
        Err(e) => Reply::private(split_error_reply(&e)),
    }
}

fn split_error_reply(e: &SplitError) -> &'static str {
    match e {
        SplitError::NoActiveEvent => "❌ Nenhum evento ativo.",
        SplitError::InvalidTotal => "❌ total deve ser > 0",
        SplitError::InvalidTax => "❌ taxa 0-100 %",
        SplitError::NoParticipants => "❌ Nenhum participante.",
        SplitError::OverDeduction => "❌ Taxa + reparo maiores que o total.",
        SplitError::Store(_) => INTERNAL_ERROR,
    }
}

async fn balance(ctx: &BotContext, invocation: &Invocation<'_>) -> Reply {
    let user = invocation.user("user").unwrap_or(invocation.caller.user);
    let value = match Treasury::new(ctx).balance_of(user).await {
        Ok(value) => value,
        Err(e) => {
            error!(error = %e, %user, "Failed to read balance");
            return Reply::private(INTERNAL_ERROR);
        }
    };
    let name = target_name(ctx, invocation, user).await;
    Reply::public(format!(
        "💰 **Saldo de {name}:** `{}`",
        format_coin(value)
    ))
}

async fn pay(ctx: &BotContext, invocation: &Invocation<'_>) -> Reply {
    if !invocation.caller.is_admin(&ctx.settings.admin_role) {
        return Reply::private(NO_PERMISSION);
    }
    let (Some(user), Some(value)) = (invocation.user("user"), invocation.integer("value")) else {
        return Reply::private(MISSING_OPTION);
    };
    let value = u64::try_from(value).unwrap_or(0);
    let name = target_name(ctx, invocation, user).await;
    let outcome = Treasury::new(ctx).record_payment(user, value).await;
    Reply::private(payment_reply(&name, value, outcome))
}

fn payment_reply(name: &str, value: u64, outcome: Result<u64, PaymentError>) -> String {
    match outcome {
        Ok(remaining) => format!(
            "✅ Registrado pagamento de `{}` para {name}.\nSaldo restante: `{}`",
            format_coin(value),
            format_coin(remaining)
        ),
        Err(PaymentError::InvalidAmount) => "❌ O valor deve ser > 0.".to_string(),
        Err(PaymentError::NothingOwed) => format!("{name} não possui saldo pendente."),
        Err(PaymentError::InsufficientBalance { balance }) => format!(
            "Saldo de {} é menor que o valor informado.",
            format_coin(balance)
        ),
        Err(PaymentError::Store(e)) => {
            error!(error = %e, "Failed to record payment");
            INTERNAL_ERROR.to_string()
        }
    }
}

async fn register(ctx: &BotContext, invocation: &Invocation<'_>) -> Reply {
    let Some(nickname) = invocation.string("nickname") else {
        return Reply::private(MISSING_OPTION);
    };
    let outcome = RegistrationArbiter::new(ctx)
        .register(invocation.caller, invocation.channel, nickname)
        .await;
    Reply::private(registration_reply(outcome))
}

fn registration_reply(outcome: Result<RegisterOutcome, RegistrationError>) -> String {
    match outcome {
        Ok(RegisterOutcome::Registered {
            nickname, renamed, ..
        }) => {
            let nick_msg = if renamed {
                format!("Seu apelido foi alterado para **{nickname}**.")
            } else {
                "Não consegui alterar seu apelido (permissão faltando).".to_string()
            };
            format!("✅ Registro concluído! {nick_msg}")
        }
        Ok(RegisterOutcome::AlreadyBound) => "Você já está registrado com esse nickname. \
             Use `/unregister` se precisar alterar."
            .to_string(),
        Err(RegistrationError::Cooldown(retry)) => format!(
            "⏳ Você usou esse comando recentemente. Tente novamente em **{} s**.",
            format_seconds(retry.as_secs_f64())
        ),
        Err(RegistrationError::WrongChannel(channel)) => format!("Use o comando em <#{channel}>."),
        Err(RegistrationError::AlreadyRegistered) => "Você já está registrado. \
             Use `/unregister` se precisar alterar seus dados."
            .to_string(),
        Err(RegistrationError::NicknameTaken) => "Este nickname já foi registrado por outro membro.\n\
             Se acredita que há um engano, contate a moderação (@senate ou @caesar)."
            .to_string(),
        Err(RegistrationError::PlayerNotFound) => "Não encontrei esse nick na API do Albion. \
             Verifique se digitou **exatamente** (maiúsculas/minúsculas não importam)."
            .to_string(),
        Err(RegistrationError::LookupUnavailable(_)) => {
            "⚠️ A API do Albion não respondeu. Tente novamente em alguns instantes.".to_string()
        }
        Err(RegistrationError::NoGuild) => "Você não está em nenhuma guild no momento. \
             Entre em uma guild válida e tente novamente."
            .to_string(),
        Err(RegistrationError::UnauthorizedGuild { guild_name }) => format!(
            "Sua guild (**{guild_name}**) não é autorizada.\n\
             Se você acredita que houve um engano, \
             por favor mencione a moderação (@senate ou @caesar)."
        ),
        Err(RegistrationError::RoleGrantFailed(_)) => "Não tenho permissão para adicionar cargos. \
             Avise a moderação (@senate ou @caesar)."
            .to_string(),
        Err(e @ (RegistrationError::Platform(_) | RegistrationError::Store(_))) => {
            error!(error = %e, "Registration failed");
            INTERNAL_ERROR.to_string()
        }
    }
}

async fn unregister(ctx: &BotContext, invocation: &Invocation<'_>) -> Reply {
    let outcome = RegistrationArbiter::new(ctx)
        .unregister(invocation.caller)
        .await;
    Reply::private(unregister_reply(outcome))
}

fn unregister_reply(outcome: Result<Option<String>, UnregisterError>) -> &'static str {
    match outcome {
        Ok(_) => "✅ Registro removido. Você pode registrar novamente.",
        Err(UnregisterError::NotRegistered) => "Você ainda não está registrado.",
        Err(UnregisterError::RoleRevokeFailed(_)) => {
            "Não consegui remover o cargo (permissão faltando)."
        }
        Err(e @ (UnregisterError::Platform(_) | UnregisterError::Store(_))) => {
            error!(error = %e, "Unregister failed");
            INTERNAL_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use incitatus_core::game_data::GameDataError;
    use incitatus_core::ids::ChannelId;
    use incitatus_core::platform::PlatformError;
    use std::time::Duration;

    #[test]
    fn cooldown_reply_trims_trailing_zeros() {
        let reply = registration_reply(Err(RegistrationError::Cooldown(Duration::from_secs(12))));
        assert_eq!(
            reply,
            "⏳ Você usou esse comando recentemente. Tente novamente em **12 s**."
        );
        let reply =
            registration_reply(Err(RegistrationError::Cooldown(Duration::from_millis(4_500))));
        assert!(reply.contains("**4.5 s**"));
    }

    #[test]
    fn lookup_failure_is_not_reported_as_not_found() {
        let unavailable = registration_reply(Err(RegistrationError::LookupUnavailable(
            GameDataError::Unavailable("timeout".into()),
        )));
        let missing = registration_reply(Err(RegistrationError::PlayerNotFound));
        assert_ne!(unavailable, missing);
        assert!(missing.starts_with("Não encontrei esse nick"));
    }

    #[test]
    fn registration_replies_name_the_details() {
        assert_eq!(
            registration_reply(Err(RegistrationError::WrongChannel(ChannelId(77)))),
            "Use o comando em <#77>."
        );
        let reply = registration_reply(Err(RegistrationError::UnauthorizedGuild {
            guild_name: "Barbari".into(),
        }));
        assert!(reply.starts_with("Sua guild (**Barbari**) não é autorizada."));
        let reply = registration_reply(Ok(RegisterOutcome::Registered {
            player_name: "Crassus".into(),
            nickname: "[LEGIO] Crassus".into(),
            renamed: true,
        }));
        assert_eq!(
            reply,
            "✅ Registro concluído! Seu apelido foi alterado para **[LEGIO] Crassus**."
        );
        let reply = registration_reply(Err(RegistrationError::RoleGrantFailed(
            PlatformError::Forbidden,
        )));
        assert!(reply.starts_with("Não tenho permissão para adicionar cargos."));
    }

    #[test]
    fn payment_replies() {
        assert_eq!(
            payment_reply("Livia", 1_000, Ok(234_567)),
            "✅ Registrado pagamento de `1.000` para Livia.\nSaldo restante: `234.567`"
        );
        assert_eq!(
            payment_reply("Livia", 10, Err(PaymentError::NothingOwed)),
            "Livia não possui saldo pendente."
        );
        assert_eq!(
            payment_reply(
                "Livia",
                5_000,
                Err(PaymentError::InsufficientBalance { balance: 1_200 })
            ),
            "Saldo de 1.200 é menor que o valor informado."
        );
    }

    #[test]
    fn split_and_unregister_replies() {
        assert_eq!(
            split_error_reply(&SplitError::NoActiveEvent),
            "❌ Nenhum evento ativo."
        );
        assert_eq!(
            split_error_reply(&SplitError::OverDeduction),
            "❌ Taxa + reparo maiores que o total."
        );
        assert_eq!(
            unregister_reply(Err(UnregisterError::NotRegistered)),
            "Você ainda não está registrado."
        );
        assert_eq!(
            unregister_reply(Ok(Some("crassus".into()))),
            "✅ Registro removido. Você pode registrar novamente."
        );
    }
}
