//! Durable storage: message backups and the processed-id ledger.

pub mod backup;
pub mod ledger;

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::mail::Uid;

pub use backup::DirBackupStore;
pub use ledger::FileLedger;

/// Write-once store for raw message backups.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Persist `raw` under a key built from `uid` and `subject`. Returns where
    /// it landed. Name collisions are resolved by the store.
    async fn write(&self, uid: Uid, subject: &str, raw: &[u8]) -> Result<PathBuf, StorageError>;
}

/// Append-only record of messages whose disposition is final.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Record `uid` as processed. Appending a known id must not duplicate it.
    async fn append(&self, uid: Uid) -> Result<(), StorageError>;

    /// Every id recorded so far.
    async fn processed(&self) -> HashSet<Uid>;
}
