//! File-backed processed ledger: one decimal UID per line, append-only.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::mail::Uid;
use crate::store::Ledger;

struct LedgerState {
    file: fs::File,
    seen: HashSet<Uid>,
}

/// Append-only ledger file. Existing entries are loaded on open so repeated
/// appends of the same id never produce duplicate lines.
pub struct FileLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl FileLedger {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let existing = match fs::read(&path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let seen = parse_entries(&existing);

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        // A torn last line must not swallow the next append.
        if !existing.is_empty() && !existing.ends_with('\n') {
            file.write_all(b"\n").await?;
        }

        debug!(path = %path.display(), entries = seen.len(), "Ledger opened");

        Ok(Self {
            path,
            state: Mutex::new(LedgerState { file, seen }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Ledger for FileLedger {
    async fn append(&self, uid: Uid) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        if state.seen.contains(&uid) {
            debug!(uid = %uid, "Already in ledger");
            return Ok(());
        }

        state.file.write_all(format!("{uid}\n").as_bytes()).await?;
        state.file.sync_data().await?;
        state.seen.insert(uid);
        Ok(())
    }

    async fn processed(&self) -> HashSet<Uid> {
        self.state.lock().await.seen.clone()
    }
}

/// Parse ledger contents, ignoring blank and malformed lines.
fn parse_entries(contents: &str) -> HashSet<Uid> {
    contents
        .lines()
        .filter_map(|line| line.trim().parse().ok().map(Uid))
        .collect()
}
