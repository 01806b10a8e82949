//! Directory-backed backup store: one `.eml` file per disposed message.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::StorageError;
use crate::mail::Uid;
use crate::store::BackupStore;

/// Longest subject fragment kept in a file name.
const MAX_SUBJECT_CHARS: usize = 60;

/// Give up on collision suffixes after this many attempts.
const MAX_COLLISION_SUFFIX: u32 = 1000;

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9._-]+").expect("static regex is valid")
});

/// Stores backups as `<dir>/<uid>_<subject>.eml`.
pub struct DirBackupStore {
    dir: PathBuf,
}

impl DirBackupStore {
    /// Create the store, making `dir` if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl BackupStore for DirBackupStore {
    async fn write(&self, uid: Uid, subject: &str, raw: &[u8]) -> Result<PathBuf, StorageError> {
        let stem = backup_stem(uid, subject);

        for attempt in 0..MAX_COLLISION_SUFFIX {
            let name = if attempt == 0 {
                format!("{stem}.eml")
            } else {
                format!("{stem}-{attempt}.eml")
            };
            let path = self.dir.join(name);

            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };

            file.write_all(raw).await?;
            file.sync_all().await?;
            return Ok(path);
        }

        Err(StorageError::NamesExhausted(stem))
    }
}

/// `<uid>_<sanitized subject>`, or just `<uid>` for an empty subject.
pub fn backup_stem(uid: Uid, subject: &str) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(subject.trim(), "_");
    let fragment: String = cleaned
        .trim_matches(|c: char| c == '_' || c == '.')
        .chars()
        .take(MAX_SUBJECT_CHARS)
        .collect();

    if fragment.is_empty() {
        uid.to_string()
    } else {
        format!("{uid}_{fragment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_replaces_spaces_and_symbols() {
        assert_eq!(backup_stem(Uid(7), "Old newsletter"), "7_Old_newsletter");
        assert_eq!(
            backup_stem(Uid(8), "Re: 50% off!! / today"),
            "8_Re_50_off_today"
        );
    }

    #[test]
    fn stem_blocks_path_traversal() {
        let stem = backup_stem(Uid(1), "../../etc/passwd");
        assert!(!stem.contains('/'));
        assert!(!stem.contains(".."));
        assert_eq!(stem, "1_etc_passwd");
    }

    #[test]
    fn stem_empty_subject() {
        assert_eq!(backup_stem(Uid(3), ""), "3");
        assert_eq!(backup_stem(Uid(3), "   ???  "), "3");
    }

    #[test]
    fn stem_truncates_long_subject() {
        let stem = backup_stem(Uid(2), &"a".repeat(500));
        assert_eq!(stem.len(), 2 + MAX_SUBJECT_CHARS);
    }

    #[tokio::test]
    async fn write_creates_file_with_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirBackupStore::open(dir.path().join("backups")).await.unwrap();

        let path = store
            .write(Uid(42), "Old newsletter", b"From: a@b\r\n\r\nhi")
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "42_Old_newsletter.eml");
        assert_eq!(std::fs::read(&path).unwrap(), b"From: a@b\r\n\r\nhi");
    }

    #[tokio::test]
    async fn write_resolves_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirBackupStore::open(dir.path()).await.unwrap();

        let first = store.write(Uid(1), "Same", b"one").await.unwrap();
        let second = store.write(Uid(1), "Same", b"two").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(second.file_name().unwrap(), "1_Same-1.eml");
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
    }

    #[tokio::test]
    async fn write_fails_when_every_suffix_is_taken() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirBackupStore::open(dir.path()).await.unwrap();

        std::fs::write(dir.path().join("5_Busy.eml"), b"").unwrap();
        for n in 1..MAX_COLLISION_SUFFIX {
            std::fs::write(dir.path().join(format!("5_Busy-{n}.eml")), b"").unwrap();
        }

        let err = store.write(Uid(5), "Busy", b"new").await.unwrap_err();
        assert!(matches!(err, StorageError::NamesExhausted(ref stem) if stem == "5_Busy"));
    }
}
