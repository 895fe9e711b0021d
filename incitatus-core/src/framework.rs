//! Whole-document JSON persistence.
//!
//! Every piece of durable state is a single JSON file that is read whole at
//! startup and rewritten whole on every mutation. Writes go to a sibling
//! temp file first and are renamed over the target, so a crash mid-write
//! leaves the previous version intact.

use crate::entities::Ledgers;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while reading or writing a persisted document.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Handle to one JSON document on disk.
#[derive(Debug)]
pub struct JsonDocument<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonDocument<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> JsonDocument<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Read the document, falling back to `default` when the file does not
    /// exist yet. A file that exists but cannot be parsed is an error.
    pub async fn load_or_else(&self, default: impl FnOnce() -> T) -> Result<T, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "document missing, using default");
                return Ok(default());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Rewrite the whole document atomically.
    pub async fn save(&self, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        tokio::fs::write(&temp_path, json).await.map_err(io_err)?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(io_err)?;
        Ok(())
    }
}

/// An in-memory value paired with the document it is persisted to.
///
/// The in-memory value only changes after the new version has been
/// written, so memory and disk never disagree after a failed write.
#[derive(Debug)]
pub struct Persisted<T> {
    document: JsonDocument<T>,
    value: T,
}

impl<T: Serialize + DeserializeOwned + Clone> Persisted<T> {
    pub async fn open(
        document: JsonDocument<T>,
        default: impl FnOnce() -> T,
    ) -> Result<Self, StoreError> {
        let value = document.load_or_else(default).await?;
        Ok(Self { document, value })
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Apply `f` to a copy of the value, persist the copy, then swap it in.
    pub async fn mutate<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let mut next = self.value.clone();
        let result = f(&mut next);
        self.document.save(&next).await?;
        self.value = next;
        Ok(result)
    }

    /// Rewrite the current value to disk unchanged.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.document.save(&self.value).await
    }
}

/// File names of the six persisted documents inside the data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub config: PathBuf,
    pub members: PathBuf,
    pub ranking: PathBuf,
    pub balances: PathBuf,
    pub alliance: PathBuf,
    pub registrations: PathBuf,
}

impl StoragePaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            config: dir.join("config.json"),
            members: dir.join("members.json"),
            ranking: dir.join("ranking.json"),
            balances: dir.join("balances.json"),
            alliance: dir.join("alliance.json"),
            registrations: dir.join("registrations.json"),
        }
    }
}

/// Executes ledger operations (see [`crate::entities`]) against the shared
/// in-memory ledgers.
///
/// Each operation is a plain struct with a `Processor` implementation on
/// this type, so call sites read `ledgers.process(CreditBalances { .. })`.
#[derive(Clone)]
pub struct LedgerProcessor {
    pub ledgers: Arc<Ledgers>,
}
