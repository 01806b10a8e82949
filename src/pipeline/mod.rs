//! Mailbox triage pipeline.
//!
//! Five stages joined by bounded queues:
//!
//! ```text
//! Fetcher -> Unpacker -> Triager -+-> Disposer -+-> Ledger Writer
//!                                 +-------------+
//! ```
//!
//! 1. `Fetcher` pulls a bounded window of raw messages from the mailbox.
//! 2. `unpacker::run` decodes headers and picks a body text.
//! 3. `Triager` applies the age rule, then asks the classifier.
//! 4. `Disposer` backs up and deletes DISPOSE messages.
//! 5. `LedgerWriter` records every UID that reached a terminal state.
//!
//! A queue closes when every sender for it is dropped, so each stage ends
//! once its input is drained. The run is over when all five tasks finish.

pub mod disposer;
pub mod fetcher;
pub mod ledger_writer;
pub mod triager;
pub mod types;
pub mod unpacker;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{Instrument, info};

use crate::classify::Classifier;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::mail::MailTransport;
use crate::store::{BackupStore, Ledger};

pub use disposer::Disposer;
pub use fetcher::Fetcher;
pub use ledger_writer::LedgerWriter;
pub use triager::Triager;
pub use types::{Decision, DispositionRecord, ParsedMessage, RawMessage, RunReport, Verdict};

/// One configured triage run over a mailbox folder.
pub struct Pipeline {
    transport: Arc<dyn MailTransport>,
    classifier: Arc<dyn Classifier>,
    backups: Arc<dyn BackupStore>,
    ledger: Arc<dyn Ledger>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        classifier: Arc<dyn Classifier>,
        backups: Arc<dyn BackupStore>,
        ledger: Arc<dyn Ledger>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            transport,
            classifier,
            backups,
            ledger,
            config,
        }
    }

    /// Run every stage to completion.
    ///
    /// Stages always run to the end of their input, even after another stage
    /// failed; the first failure in pipeline order is returned.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let capacity = self.config.queue_capacity.max(1);
        let (raw_tx, raw_rx) = mpsc::channel(capacity);
        let (parsed_tx, parsed_rx) = mpsc::channel(capacity);
        let (dispose_tx, dispose_rx) = mpsc::channel(capacity);
        let (done_tx, done_rx) = mpsc::channel(capacity);

        let processed = self.ledger.processed().await;
        info!(
            folder = %self.config.folder,
            max_messages = self.config.max_messages,
            already_processed = processed.len(),
            "Starting triage run"
        );

        let fetcher = Fetcher::new(
            self.transport.clone(),
            self.config.folder.clone(),
            self.config.max_messages,
            processed,
        );
        let triager = Triager::new(
            self.classifier.clone(),
            self.config.max_age,
            self.config.concurrency,
        );
        let disposer = Disposer::new(self.transport.clone(), self.backups.clone());
        let writer = LedgerWriter::new(self.ledger.clone());

        // The Triager and the Disposer both feed the ledger queue.
        let kept_tx = done_tx.clone();

        let fetch = tokio::spawn(fetcher.run(raw_tx).in_current_span());
        let unpack = tokio::spawn(unpacker::run(raw_rx, parsed_tx).in_current_span());
        let triage = tokio::spawn(triager.run(parsed_rx, dispose_tx, kept_tx).in_current_span());
        let dispose = tokio::spawn(disposer.run(dispose_rx, done_tx).in_current_span());
        let ledger = tokio::spawn(writer.run(done_rx).in_current_span());

        let (fetch, unpack, triage, dispose, ledger) =
            tokio::join!(fetch, unpack, triage, dispose, ledger);

        let fetch = joined("fetcher", fetch)??;
        let unpack = joined("unpacker", unpack)?;
        let triage = joined("triager", triage)?;
        let dispose = joined("disposer", dispose)??;
        let ledgered = joined("ledger writer", ledger)??;

        let report = RunReport {
            fetched: fetch.fetched,
            skipped: fetch.skipped,
            parsed: unpack.parsed,
            dropped: unpack.dropped + triage.dropped + dispose.dropped,
            aged_out: triage.aged_out,
            classified: triage.classified,
            fallbacks: triage.fallbacks,
            kept: triage.kept,
            disposed: dispose.deleted + dispose.degraded_deletes,
            backup_failures: dispose.backup_failures,
            degraded_deletes: dispose.degraded_deletes,
            ledgered,
        };

        info!(
            fetched = report.fetched,
            kept = report.kept,
            disposed = report.disposed,
            dropped = report.dropped,
            ledgered = report.ledgered,
            "Triage run complete"
        );

        Ok(report)
    }
}

fn joined<T>(stage: &'static str, result: Result<T, JoinError>) -> Result<T, PipelineError> {
    result.map_err(|e| PipelineError::StagePanicked {
        stage,
        reason: e.to_string(),
    })
}
