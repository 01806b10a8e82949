//! Disposer: backs up, then deletes, messages the Triager disposed of.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::mail::{MailTransport, Uid};
use crate::pipeline::types::{DispositionRecord, MessageLabel};
use crate::store::BackupStore;

const STAGE: &str = "disposer";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisposeReport {
    pub deleted: usize,
    pub degraded_deletes: usize,
    pub backup_failures: usize,
    /// Records that never reach the ledger (no UID, backup failed, or the
    /// server refused the delete flag).
    pub dropped: usize,
}

pub struct Disposer {
    transport: Arc<dyn MailTransport>,
    backups: Arc<dyn BackupStore>,
}

impl Disposer {
    pub fn new(transport: Arc<dyn MailTransport>, backups: Arc<dyn BackupStore>) -> Self {
        Self { transport, backups }
    }

    /// Process every record from `rx`. A UID is forwarded to `done_tx` only
    /// after its backup is written and the delete was attempted.
    ///
    /// Fails the run on a dead mailbox session; `done_tx` is dropped either way.
    /// Once the Ledger Writer is gone nothing more is deleted, since further
    /// deletes could not be recorded.
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<DispositionRecord>,
        done_tx: mpsc::Sender<Uid>,
    ) -> Result<DisposeReport, PipelineError> {
        let mut report = DisposeReport::default();

        while let Some(record) = rx.recv().await {
            let message = &record.message;
            let label = MessageLabel(message.seq, message.uid);

            let Some(uid) = message.uid else {
                warn!(message = %label, "Cannot delete a message without UID; leaving it");
                report.dropped += 1;
                continue;
            };

            if done_tx.is_closed() {
                error!(message = %label, "Ledger writer gone; stopping before further deletes");
                break;
            }

            let path = match self.backups.write(uid, &message.subject, &message.raw).await {
                Ok(path) => path,
                Err(e) => {
                    error!(message = %label, error = %e, "Backup failed; message left in mailbox");
                    report.backup_failures += 1;
                    report.dropped += 1;
                    continue;
                }
            };

            match self.transport.mark_deleted(uid).await {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    warn!(message = %label, error = %e, "Server refused delete flag; will retry next run");
                    report.dropped += 1;
                    continue;
                }
                Err(source) => return Err(PipelineError::Transport { stage: STAGE, source }),
            }

            match self.transport.expunge(uid).await {
                Ok(()) => report.deleted += 1,
                Err(e) if e.is_recoverable() => {
                    warn!(message = %label, error = %e, "Expunge unavailable; message left flagged \\Deleted");
                    report.degraded_deletes += 1;
                }
                Err(source) => return Err(PipelineError::Transport { stage: STAGE, source }),
            }

            info!(
                message = %label,
                subject = %message.subject,
                backup = %path.display(),
                decision = record.decision.label(),
                justification = record.verdict.justification(),
                "Disposed"
            );

            if done_tx.send(uid).await.is_err() {
                error!(message = %label, "Ledger writer gone; disposal not recorded");
                break;
            }
        }

        Ok(report)
    }
}
