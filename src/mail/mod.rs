//! Mail-transport connector: the mailbox session the pipeline reads from
//! and deletes through.
//!
//! The `MailTransport` trait is the only thing the pipeline sees. The IMAP
//! implementation lives in [`imap`].

pub mod imap;

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;

use crate::error::TransportError;

pub use imap::{ImapMailbox, ImapSession};

/// Server-assigned message identifier, stable across sessions (IMAP UID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(pub u32);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One message as returned by a bulk fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Position in the current folder snapshot. Only valid for this session.
    pub seq: u32,
    /// Stable identifier, if the server sent one.
    pub uid: Option<Uid>,
    /// Full raw message, if the server sent a literal body.
    pub body: Option<Vec<u8>>,
}

/// A mailbox session able to list, read and delete messages in one folder.
///
/// Implementations must serialise commands internally; the pipeline calls
/// this from the Fetcher and the Disposer concurrently.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Select `folder` and return its message count.
    async fn select_folder(&self, folder: &str) -> Result<u32, TransportError>;

    /// Fetch at most `max_count` messages (UID + full body) from the
    /// selected folder, lowest sequence numbers first. Messages whose UID is
    /// in `exclude` do not count towards the window and are not returned.
    async fn fetch_raw(
        &self,
        max_count: u32,
        exclude: &HashSet<Uid>,
    ) -> Result<Vec<FetchedMessage>, TransportError>;

    /// Flag a message as deleted.
    async fn mark_deleted(&self, uid: Uid) -> Result<(), TransportError>;

    /// Permanently remove a flagged message. Returns
    /// `TransportError::Unsupported` when the server cannot expunge by UID.
    async fn expunge(&self, uid: Uid) -> Result<(), TransportError>;
}
