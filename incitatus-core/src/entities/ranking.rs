use crate::entities::top_entries;
use crate::framework::{LedgerProcessor, StoreError};
use crate::ids::UserId;
use indexmap::IndexMap;
use kanau::processor::Processor;

/// Number of completed events each user took part in.
pub type RankingLedger = IndexMap<UserId, u64>;

#[derive(Debug, Clone)]
/// Add exactly one participation to each listed user and persist.
///
/// Duplicate ids in `users` are counted once.
pub struct IncrementRanking {
    pub users: Vec<UserId>,
}

impl Processor<IncrementRanking> for LedgerProcessor {
    type Output = ();
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "Ledger:IncrementRanking")]
    async fn process(&self, op: IncrementRanking) -> Result<(), StoreError> {
        let mut ranking = self.ledgers.ranking.lock().await;
        ranking
            .mutate(|entries| {
                let mut seen = std::collections::HashSet::new();
                for user in op.users {
                    if seen.insert(user) {
                        *entries.entry(user).or_insert(0) += 1;
                    }
                }
            })
            .await
    }
}

#[derive(Debug, Clone)]
/// The leaderboard: top `limit` users by participation count.
pub struct TopRanking {
    pub limit: usize,
}

impl Processor<TopRanking> for LedgerProcessor {
    type Output = Vec<(UserId, u64)>;
    type Error = StoreError;
    async fn process(&self, query: TopRanking) -> Result<Vec<(UserId, u64)>, StoreError> {
        let ranking = self.ledgers.ranking.lock().await;
        Ok(top_entries(ranking.get(), query.limit))
    }
}
