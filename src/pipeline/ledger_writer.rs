//! Ledger Writer: the single writer of the processed ledger.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::PipelineError;
use crate::mail::Uid;
use crate::store::Ledger;

pub struct LedgerWriter {
    ledger: Arc<dyn Ledger>,
}

impl LedgerWriter {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Append every UID from `rx` until all senders are gone.
    ///
    /// A failed append stops the stage; the run cannot vouch for what it
    /// did without the ledger.
    pub async fn run(self, mut rx: mpsc::Receiver<Uid>) -> Result<usize, PipelineError> {
        let mut written = 0;
        while let Some(uid) = rx.recv().await {
            if let Err(e) = self.ledger.append(uid).await {
                error!(uid = %uid, error = %e, "Ledger append failed");
                return Err(e.into());
            }
            debug!(uid = %uid, "Ledgered");
            written += 1;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::StorageError;

    #[derive(Default)]
    struct MemoryLedger {
        lines: Mutex<Vec<Uid>>,
        fail_on: Option<Uid>,
    }

    #[async_trait]
    impl Ledger for MemoryLedger {
        async fn append(&self, uid: Uid) -> Result<(), StorageError> {
            if self.fail_on == Some(uid) {
                return Err(StorageError::Io(std::io::Error::other("read-only fs")));
            }
            self.lines.lock().unwrap().push(uid);
            Ok(())
        }

        async fn processed(&self) -> HashSet<Uid> {
            self.lines.lock().unwrap().iter().copied().collect()
        }
    }

    #[tokio::test]
    async fn appends_from_multiple_producers() {
        let ledger = Arc::new(MemoryLedger::default());
        let (tx, rx) = mpsc::channel(4);
        let tx2 = tx.clone();

        let writer = tokio::spawn(LedgerWriter::new(ledger.clone()).run(rx));
        tx.send(Uid(1)).await.unwrap();
        tx2.send(Uid(2)).await.unwrap();
        drop(tx);
        drop(tx2);

        assert_eq!(writer.await.unwrap().unwrap(), 2);
        assert_eq!(ledger.processed().await, HashSet::from([Uid(1), Uid(2)]));
    }

    #[tokio::test]
    async fn append_failure_stops_stage() {
        let ledger = Arc::new(MemoryLedger {
            fail_on: Some(Uid(2)),
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel(4);
        tx.send(Uid(1)).await.unwrap();
        tx.send(Uid(2)).await.unwrap();
        tx.send(Uid(3)).await.unwrap();
        drop(tx);

        let err = LedgerWriter::new(ledger.clone()).run(rx).await.unwrap_err();
        assert!(matches!(err, PipelineError::Ledger(_)));
        assert_eq!(*ledger.lines.lock().unwrap(), vec![Uid(1)]);
    }
}
