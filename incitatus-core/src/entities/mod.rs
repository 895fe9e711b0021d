//! Persisted ledgers and the operations that read and mutate them.
//!
//! Every ledger sits behind its own lock so that an operation on one ledger
//! never waits for another. Operations are executed through
//! [`LedgerProcessor`](crate::framework::LedgerProcessor).

pub mod alliance;
pub mod balance;
pub mod ranking;
pub mod registration;
pub mod roster;

pub use alliance::AllianceWhitelist;
pub use balance::{
    BalanceLedger, CreditBalances, DebitBalance, GetBalance, PaymentError, TopBalances,
};
pub use ranking::{IncrementRanking, RankingLedger, TopRanking};
pub use registration::{
    BindOutcome, BindRegistration, FindRegistration, RegistrationBook, ReleaseRegistration,
    nickname_key,
};
pub use roster::{GetRoster, ReplaceRoster, RosterSnapshot};

use crate::framework::{JsonDocument, Persisted, StoragePaths, StoreError};
use crate::ids::UserId;
use incitatus_sdk::objects::AllianceDocument;
use indexmap::IndexMap;
use itertools::Itertools;
use tokio::sync::Mutex;

/// All ledgers of the bot, loaded once at startup.
pub struct Ledgers {
    pub(crate) ranking: Mutex<Persisted<RankingLedger>>,
    pub(crate) balances: Mutex<Persisted<BalanceLedger>>,
    pub(crate) registrations: Mutex<Persisted<RegistrationBook>>,
    pub(crate) roster: Mutex<Persisted<RosterSnapshot>>,
    pub(crate) alliance: AllianceWhitelist,
}

impl Ledgers {
    /// Load every ledger document, creating empty ledgers for missing files.
    pub async fn open(paths: &StoragePaths) -> Result<Self, StoreError> {
        let ranking = Persisted::open(JsonDocument::new(&paths.ranking), IndexMap::new).await?;
        let balances = Persisted::open(JsonDocument::new(&paths.balances), IndexMap::new).await?;
        let registrations =
            Persisted::open(JsonDocument::new(&paths.registrations), IndexMap::new).await?;
        let roster = Persisted::open(JsonDocument::new(&paths.members), Default::default).await?;
        let alliance = JsonDocument::<AllianceDocument>::new(&paths.alliance)
            .load_or_else(AllianceDocument::default)
            .await?;

        let ledgers = Self {
            ranking: Mutex::new(ranking),
            balances: Mutex::new(balances),
            registrations: Mutex::new(registrations),
            roster: Mutex::new(roster),
            alliance: AllianceWhitelist::from_document(&alliance),
        };

        tracing::info!(
            ranked = ledgers.ranking.lock().await.get().len(),
            balances = ledgers.balances.lock().await.get().len(),
            registrations = ledgers.registrations.lock().await.get().len(),
            members = ledgers.roster.lock().await.get().len(),
            allied_guilds = ledgers.alliance.len(),
            "Ledgers loaded"
        );
        if ledgers.alliance.is_empty() {
            tracing::warn!("Alliance whitelist is empty, every registration will be refused");
        }

        Ok(ledgers)
    }

    pub fn alliance(&self) -> &AllianceWhitelist {
        &self.alliance
    }

    /// Rewrite every mutable ledger to disk.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.ranking.lock().await.flush().await?;
        self.balances.lock().await.flush().await?;
        self.registrations.lock().await.flush().await?;
        self.roster.lock().await.flush().await?;
        Ok(())
    }
}

/// The `limit` largest entries, descending by value.
///
/// The sort is stable, so equal values keep the ledger's insertion order.
pub(crate) fn top_entries(map: &IndexMap<UserId, u64>, limit: usize) -> Vec<(UserId, u64)> {
    map.iter()
        .map(|(user, value)| (*user, *value))
        .sorted_by(|a, b| b.1.cmp(&a.1))
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_entries_breaks_ties_by_insertion_order() {
        let mut map = IndexMap::new();
        map.insert(UserId(3), 5);
        map.insert(UserId(1), 9);
        map.insert(UserId(2), 5);
        map.insert(UserId(4), 1);

        let top = top_entries(&map, 3);
        assert_eq!(top, vec![(UserId(1), 9), (UserId(3), 5), (UserId(2), 5)]);
    }

    #[tokio::test]
    async fn open_reads_legacy_documents() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StoragePaths::in_dir(dir.path());
        std::fs::write(&paths.ranking, r#"{"111": 4, "222": 7}"#).unwrap();
        std::fs::write(&paths.members, r#"["Brutus", "Cassius"]"#).unwrap();
        std::fs::write(&paths.registrations, r#"{"brutus": 111}"#).unwrap();
        std::fs::write(
            &paths.alliance,
            r#"{"Guilds": [{"Id": "g-1", "Name": "Roma"}], "Name": "SPQR"}"#,
        )
        .unwrap();

        let ledgers = Ledgers::open(&paths).await.unwrap();

        assert_eq!(ledgers.ranking.lock().await.get().get(&UserId(222)), Some(&7));
        assert_eq!(ledgers.roster.lock().await.get().len(), 2);
        assert_eq!(
            ledgers.registrations.lock().await.get().get("brutus"),
            Some(&UserId(111))
        );
        assert!(ledgers.alliance().contains("g-1"));
        assert!(ledgers.balances.lock().await.get().is_empty());
    }
}
