use crate::entities::top_entries;
use crate::framework::{LedgerProcessor, StoreError};
use crate::ids::UserId;
use indexmap::IndexMap;
use kanau::processor::Processor;
use thiserror::Error;

/// Outstanding loot credit per user.
pub type BalanceLedger = IndexMap<UserId, u64>;

#[derive(Debug, Clone)]
/// Credit `amount` to each listed user and persist.
pub struct CreditBalances {
    pub users: Vec<UserId>,
    pub amount: u64,
}

impl Processor<CreditBalances> for LedgerProcessor {
    type Output = ();
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "Ledger:CreditBalances")]
    async fn process(&self, op: CreditBalances) -> Result<(), StoreError> {
        let mut balances = self.ledgers.balances.lock().await;
        balances
            .mutate(|entries| {
                for user in op.users {
                    let balance = entries.entry(user).or_insert(0);
                    *balance = balance.saturating_add(op.amount);
                }
            })
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GetBalance {
    pub user: UserId,
}

impl Processor<GetBalance> for LedgerProcessor {
    type Output = u64;
    type Error = StoreError;
    async fn process(&self, query: GetBalance) -> Result<u64, StoreError> {
        let balances = self.ledgers.balances.lock().await;
        Ok(balances.get().get(&query.user).copied().unwrap_or(0))
    }
}

/// Reasons a payment cannot be recorded.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment value must be positive")]
    InvalidAmount,

    #[error("user has no pending balance")]
    NothingOwed,

    #[error("balance {balance} is smaller than the paid value")]
    InsufficientBalance { balance: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
/// Record a payout to `user`, reducing their balance by `amount`.
///
/// The balance is checked and reduced under the same lock, so concurrent
/// payments can never drive it below zero. Returns the remaining balance.
pub struct DebitBalance {
    pub user: UserId,
    pub amount: u64,
}

impl Processor<DebitBalance> for LedgerProcessor {
    type Output = u64;
    type Error = PaymentError;
    #[tracing::instrument(skip_all, err, name = "Ledger:DebitBalance")]
    async fn process(&self, op: DebitBalance) -> Result<u64, PaymentError> {
        if op.amount == 0 {
            return Err(PaymentError::InvalidAmount);
        }
        let mut balances = self.ledgers.balances.lock().await;
        let current = balances.get().get(&op.user).copied().unwrap_or(0);
        if current == 0 {
            return Err(PaymentError::NothingOwed);
        }
        if op.amount > current {
            return Err(PaymentError::InsufficientBalance { balance: current });
        }
        let remaining = current - op.amount;
        balances
            .mutate(|entries| {
                entries.insert(op.user, remaining);
            })
            .await?;
        Ok(remaining)
    }
}

#[derive(Debug, Clone)]
/// The balance leaderboard: top `limit` users by balance.
pub struct TopBalances {
    pub limit: usize,
}

impl Processor<TopBalances> for LedgerProcessor {
    type Output = Vec<(UserId, u64)>;
    type Error = StoreError;
    async fn process(&self, query: TopBalances) -> Result<Vec<(UserId, u64)>, StoreError> {
        let balances = self.ledgers.balances.lock().await;
        Ok(top_entries(balances.get(), query.limit))
    }
}
