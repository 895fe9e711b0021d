//! Balance lookups and payout recording.

use crate::config::Surface;
use crate::context::BotContext;
use crate::entities::{DebitBalance, GetBalance, PaymentError};
use crate::framework::StoreError;
use crate::ids::UserId;
use crate::processors::surfaces::SurfaceReconciler;
use kanau::processor::Processor;

pub struct Treasury<'a> {
    ctx: &'a BotContext,
}

impl<'a> Treasury<'a> {
    pub fn new(ctx: &'a BotContext) -> Self {
        Self { ctx }
    }

    pub async fn balance_of(&self, user: UserId) -> Result<u64, StoreError> {
        self.ctx.ledgers.process(GetBalance { user }).await
    }

    /// Reduce `user`'s balance by a payout of `amount` and refresh the
    /// balance leaderboard. Returns the remaining balance.
    #[tracing::instrument(skip_all, err, name = "Treasury:record_payment", fields(user = %user, amount = amount))]
    pub async fn record_payment(&self, user: UserId, amount: u64) -> Result<u64, PaymentError> {
        let remaining = self
            .ctx
            .ledgers
            .process(DebitBalance { user, amount })
            .await?;
        tracing::info!(remaining, "Payment recorded");
        SurfaceReconciler::new(self.ctx)
            .refresh_logged(Surface::BalanceBoard)
            .await;
        Ok(remaining)
    }
}
