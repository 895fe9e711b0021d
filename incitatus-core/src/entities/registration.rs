use crate::framework::{LedgerProcessor, StoreError};
use crate::ids::UserId;
use indexmap::IndexMap;
use kanau::processor::Processor;

/// Lowercased in-game nickname -> the chat user that claimed it.
pub type RegistrationBook = IndexMap<String, UserId>;

/// Canonical key for a nickname: trimmed and lowercased.
pub fn nickname_key(nickname: &str) -> String {
    nickname.trim().to_lowercase()
}

#[derive(Debug, Clone)]
/// Who, if anyone, holds `nickname`.
pub struct FindRegistration {
    pub nickname: String,
}

impl Processor<FindRegistration> for LedgerProcessor {
    type Output = Option<UserId>;
    type Error = StoreError;
    async fn process(&self, query: FindRegistration) -> Result<Option<UserId>, StoreError> {
        let book = self.ledgers.registrations.lock().await;
        Ok(book.get().get(&nickname_key(&query.nickname)).copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The nickname is now held by the user.
    Bound,
    /// The user already held this nickname; nothing changed.
    AlreadyHeld,
    /// Another user holds the nickname; nothing changed.
    TakenBy(UserId),
}

#[derive(Debug, Clone)]
/// Claim `nickname` for `user`, checking availability under the lock.
///
/// A user holds at most one nickname: any other nickname previously bound
/// to `user` is released in the same write.
pub struct BindRegistration {
    pub nickname: String,
    pub user: UserId,
}

impl Processor<BindRegistration> for LedgerProcessor {
    type Output = BindOutcome;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "Ledger:BindRegistration")]
    async fn process(&self, op: BindRegistration) -> Result<BindOutcome, StoreError> {
        let key = nickname_key(&op.nickname);
        let mut book = self.ledgers.registrations.lock().await;
        match book.get().get(&key) {
            Some(owner) if *owner == op.user => return Ok(BindOutcome::AlreadyHeld),
            Some(owner) => return Ok(BindOutcome::TakenBy(*owner)),
            None => {}
        }
        book.mutate(|entries| {
            entries.retain(|_, owner| *owner != op.user);
            entries.insert(key, op.user);
        })
        .await?;
        Ok(BindOutcome::Bound)
    }
}

#[derive(Debug, Clone)]
/// Drop every nickname held by `user`. Returns the released nickname.
pub struct ReleaseRegistration {
    pub user: UserId,
}

impl Processor<ReleaseRegistration> for LedgerProcessor {
    type Output = Option<String>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "Ledger:ReleaseRegistration")]
    async fn process(&self, op: ReleaseRegistration) -> Result<Option<String>, StoreError> {
        let mut book = self.ledgers.registrations.lock().await;
        let held = book
            .get()
            .iter()
            .find(|(_, owner)| **owner == op.user)
            .map(|(nick, _)| nick.clone());
        if held.is_none() {
            return Ok(None);
        }
        book.mutate(|entries| entries.retain(|_, owner| *owner != op.user))
            .await?;
        Ok(held)
    }
}
