//! Generic persisted config store.
//!
//! `ConfigStore<T>` wraps `Arc<RwLock<T>>` together with the JSON document
//! the value is mirrored to. Every update rewrites the whole document
//! before the new value becomes visible to readers.

use crate::framework::{JsonDocument, StoreError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};

/// A shared, persisted configuration value.
pub struct ConfigStore<T> {
    inner: Arc<ConfigStoreInner<T>>,
}

struct ConfigStoreInner<T> {
    data: RwLock<T>,
    document: JsonDocument<T>,
}

// -- ConfigStore --------------------------------------------------------

impl<T: Serialize + DeserializeOwned + Clone + Default> ConfigStore<T> {
    /// Load the store from `document`, starting from `T::default()` when
    /// the file does not exist yet.
    pub async fn open(document: JsonDocument<T>) -> Result<Self, StoreError> {
        let initial = document.load_or_else(T::default).await?;
        Ok(Self {
            inner: Arc::new(ConfigStoreInner {
                data: RwLock::new(initial),
                document,
            }),
        })
    }

    /// Read the current value.
    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.data.read().await
    }

    /// Mutate the value through `f` and persist the result.
    ///
    /// The write lock is held across the disk write, so updates are
    /// serialized and readers never observe a value that is not on disk.
    /// If the write fails the stored value is left as it was.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let mut guard = self.inner.data.write().await;
        let mut next = guard.clone();
        let result = f(&mut next);
        self.inner.document.save(&next).await?;
        *guard = next;
        drop(guard);
        tracing::debug!("config updated");
        Ok(result)
    }

    /// Rewrite the current value to disk.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let guard = self.inner.data.read().await;
        self.inner.document.save(&guard).await
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use crate::ids::ChannelId;

    #[tokio::test]
    async fn update_is_visible_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::<BotConfig>::open(JsonDocument::new(&path))
            .await
            .unwrap();

        store
            .update(|cfg| cfg.event_channel = Some(ChannelId(42)))
            .await
            .unwrap();

        assert_eq!(store.read().await.event_channel, Some(ChannelId(42)));
        let reopened = ConfigStore::<BotConfig>::open(JsonDocument::new(&path))
            .await
            .unwrap();
        assert_eq!(reopened.read().await.event_channel, Some(ChannelId(42)));
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            ConfigStore::<BotConfig>::open(JsonDocument::new(dir.path().join("no/such/config.json")))
                .await
                .unwrap();

        let result = store.update(|cfg| cfg.event_count = 9).await;

        assert!(result.is_err());
        assert_eq!(store.read().await.event_count, 0);
    }
}
