//! LootSplitter processor.
//!
//! The LootSplitter is responsible for:
//! - Dividing a loot total between the current event's participants
//! - Folding the division remainder into the guild cut
//! - Crediting every participant's balance
//! - Posting a breakdown of the split

use crate::config::Surface;
use crate::context::BotContext;
use crate::entities::CreditBalances;
use crate::framework::StoreError;
use crate::ids::{ChannelId, UserId};
use crate::platform::{OutgoingMessage, display_names};
use crate::processors::surfaces::SurfaceReconciler;
use crate::utils::format::format_coin;
use kanau::processor::Processor;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("no active event")]
    NoActiveEvent,

    #[error("total must be greater than zero")]
    InvalidTotal,

    #[error("tax must be between 0 and 100 percent")]
    InvalidTax,

    #[error("the event has no participants")]
    NoParticipants,

    #[error("tax plus repair exceed the total")]
    OverDeduction,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of dividing a total.
///
/// `guild_cut + per_head * participants + repair == total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub total: u64,
    pub tax_percent: u32,
    pub repair: u64,
    /// Tax plus the division remainder.
    pub guild_cut: u64,
    pub per_head: u64,
    /// Part of `guild_cut` that came from rounding down `per_head`.
    pub remainder: u64,
    pub participants: usize,
}

/// Divide `total` after tax and repair, in integer arithmetic.
pub fn compute_split(
    total: u64,
    tax_percent: u32,
    repair: u64,
    participants: usize,
) -> Result<Split, SplitError> {
    if total == 0 {
        return Err(SplitError::InvalidTotal);
    }
    if tax_percent > 100 {
        return Err(SplitError::InvalidTax);
    }
    if participants == 0 {
        return Err(SplitError::NoParticipants);
    }

    // tax_percent <= 100, so the tax never exceeds the total
    let tax = (u128::from(total) * u128::from(tax_percent) / 100) as u64;
    let remaining = total
        .checked_sub(tax)
        .and_then(|r| r.checked_sub(repair))
        .ok_or(SplitError::OverDeduction)?;

    let count = participants as u64;
    let per_head = remaining / count;
    let remainder = remaining - per_head * count;

    Ok(Split {
        total,
        tax_percent,
        repair,
        guild_cut: tax + remainder,
        per_head,
        remainder,
        participants,
    })
}

/// Lines posted after a split, empty ones omitted.
pub fn breakdown(event_id: u64, split: &Split, names: &[String]) -> String {
    let mut lines = vec![
        format!("**Evento #{event_id}**"),
        format!("Total: `{}`", format_coin(split.total)),
    ];
    if split.tax_percent > 0 || split.remainder > 0 {
        lines.push(format!(
            "Taxa guilda ({}%): `{}`",
            split.tax_percent,
            format_coin(split.guild_cut)
        ));
    }
    if split.repair > 0 {
        lines.push(format!("Reparo: `{}`", format_coin(split.repair)));
    }
    for name in names {
        lines.push(format!("• **{name}** → `{}`", format_coin(split.per_head)));
    }
    lines.join("\n")
}

#[derive(Debug, Clone, Copy)]
pub struct SplitRequest {
    pub total: u64,
    pub tax_percent: u32,
    pub repair: u64,
}

#[derive(Debug, Clone)]
pub struct SplitReport {
    pub event_id: u64,
    pub split: Split,
    pub breakdown: String,
    /// Where the breakdown went, if it could be posted.
    pub posted_to: Option<ChannelId>,
}

pub struct LootSplitter<'a> {
    ctx: &'a BotContext,
}

impl<'a> LootSplitter<'a> {
    pub fn new(ctx: &'a BotContext) -> Self {
        Self { ctx }
    }

    /// Split `request` between the running event's participants.
    ///
    /// The event lock is held until the balances are credited, so the
    /// participant set cannot change between validation and crediting.
    /// The breakdown goes to the split channel, or to `fallback` when no
    /// split channel is bound.
    #[tracing::instrument(skip_all, err, name = "LootSplitter:split")]
    pub async fn split(
        &self,
        request: SplitRequest,
        fallback: Option<ChannelId>,
    ) -> Result<SplitReport, SplitError> {
        let (event_id, users, split) = {
            let state = self.ctx.event.lock().await;
            if !state.running {
                return Err(SplitError::NoActiveEvent);
            }
            let users: Vec<UserId> = state.participants.iter().copied().collect();
            let split = compute_split(
                request.total,
                request.tax_percent,
                request.repair,
                users.len(),
            )?;
            self.ctx
                .ledgers
                .process(CreditBalances {
                    users: users.clone(),
                    amount: split.per_head,
                })
                .await?;
            (state.event_id, users, split)
        };
        info!(
            event_id,
            total = split.total,
            per_head = split.per_head,
            guild_cut = split.guild_cut,
            participants = split.participants,
            "Loot split recorded"
        );

        SurfaceReconciler::new(self.ctx)
            .refresh_logged(Surface::BalanceBoard)
            .await;

        let names = display_names(self.ctx.platform.as_ref(), self.ctx.guild, &users).await;
        let text = breakdown(event_id, &split, &names);

        let split_channel = self.ctx.config.read().await.split_channel;
        if split_channel.is_none() {
            warn!("Split channel not configured, posting in the invoking channel");
        }
        let mut posted_to = None;
        if let Some(channel) = split_channel.or(fallback) {
            match self
                .ctx
                .platform
                .send_message(channel, &OutgoingMessage::text(text.clone()))
                .await
            {
                Ok(_) => posted_to = Some(channel),
                Err(e) => warn!(%channel, error = %e, "Failed to post split breakdown"),
            }
        }

        Ok(SplitReport {
            event_id,
            split,
            breakdown: text,
            posted_to,
        })
    }
}
