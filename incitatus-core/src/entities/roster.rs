use crate::framework::{LedgerProcessor, StoreError};
use kanau::processor::Processor;
use std::collections::BTreeSet;

/// Member names seen in the last successful roster poll.
pub type RosterSnapshot = BTreeSet<String>;

#[derive(Debug, Clone)]
pub struct GetRoster;

impl Processor<GetRoster> for LedgerProcessor {
    type Output = RosterSnapshot;
    type Error = StoreError;
    async fn process(&self, _query: GetRoster) -> Result<RosterSnapshot, StoreError> {
        Ok(self.ledgers.roster.lock().await.get().clone())
    }
}

#[derive(Debug, Clone)]
/// Replace the whole snapshot with `names` and persist it.
pub struct ReplaceRoster {
    pub names: RosterSnapshot,
}

impl Processor<ReplaceRoster> for LedgerProcessor {
    type Output = ();
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "Ledger:ReplaceRoster")]
    async fn process(&self, op: ReplaceRoster) -> Result<(), StoreError> {
        let mut roster = self.ledgers.roster.lock().await;
        roster.mutate(|names| *names = op.names).await
    }
}
