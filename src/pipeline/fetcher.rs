//! Fetcher: pulls a bounded window of raw messages from the mailbox.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::mail::{MailTransport, Uid};
use crate::pipeline::types::RawMessage;

const STAGE: &str = "fetcher";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub fetched: usize,
    pub skipped: usize,
}

pub struct Fetcher {
    transport: Arc<dyn MailTransport>,
    folder: String,
    max_messages: u32,
    /// UIDs already in the ledger. They are left out of the fetch window and
    /// never emitted again.
    processed: HashSet<Uid>,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        folder: impl Into<String>,
        max_messages: u32,
        processed: HashSet<Uid>,
    ) -> Self {
        Self {
            transport,
            folder: folder.into(),
            max_messages,
            processed,
        }
    }

    /// Select the folder, fetch, and emit one `RawMessage` per usable message.
    ///
    /// `out` is dropped on every return path, closing the queue for the
    /// Unpacker even when the session fails.
    pub async fn run(self, out: mpsc::Sender<RawMessage>) -> Result<FetchReport, PipelineError> {
        let mut report = FetchReport::default();

        let exists = self
            .transport
            .select_folder(&self.folder)
            .await
            .map_err(|source| PipelineError::Transport { stage: STAGE, source })?;

        if exists == 0 {
            info!(folder = %self.folder, "Folder empty");
            return Ok(report);
        }

        let messages = self
            .transport
            .fetch_raw(self.max_messages, &self.processed)
            .await
            .map_err(|source| PipelineError::Transport { stage: STAGE, source })?;

        info!(
            folder = %self.folder,
            exists,
            fetched = messages.len(),
            "Fetched messages"
        );

        for fetched in messages {
            report.fetched += 1;

            let Some(raw) = fetched.body else {
                warn!(seq = fetched.seq, "Message without BODY[], skipping");
                report.skipped += 1;
                continue;
            };

            match fetched.uid {
                None => warn!(
                    seq = fetched.seq,
                    "Message without UID; it will be classified but cannot be deleted or ledgered"
                ),
                Some(uid) if self.processed.contains(&uid) => {
                    debug!(uid = %uid, "Already processed, skipping");
                    report.skipped += 1;
                    continue;
                }
                Some(_) => {}
            }

            let message = RawMessage {
                seq: fetched.seq,
                uid: fetched.uid,
                raw,
            };
            if out.send(message).await.is_err() {
                warn!("Unpacker stopped early; abandoning fetch");
                break;
            }
        }

        Ok(report)
    }
}
