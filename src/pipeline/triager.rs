//! Triager: decides KEEP or DISPOSE for each parsed message.
//!
//! Two rules, in order:
//! 1. Anything older than `max_age` is disposed without asking the classifier.
//! 2. Otherwise the classifier decides. Only an exact `"KEEP"` keeps the
//!    message; any other verdict disposes it. If the classifier fails in any
//!    way the message is kept.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::classify::{ClassificationRequest, Classifier};
use crate::mail::Uid;
use crate::pipeline::types::{Decision, DispositionRecord, MessageLabel, ParsedMessage, Verdict};

const KEEP: &str = "KEEP";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriageReport {
    pub aged_out: usize,
    pub classified: usize,
    pub fallbacks: usize,
    pub kept: usize,
    pub disposed: usize,
    /// KEEP verdicts for messages without a UID; nothing to ledger.
    pub dropped: usize,
}

#[derive(Default)]
struct Counters {
    aged_out: AtomicUsize,
    classified: AtomicUsize,
    fallbacks: AtomicUsize,
    kept: AtomicUsize,
    disposed: AtomicUsize,
    dropped: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn into_report(self) -> TriageReport {
        TriageReport {
            aged_out: self.aged_out.into_inner(),
            classified: self.classified.into_inner(),
            fallbacks: self.fallbacks.into_inner(),
            kept: self.kept.into_inner(),
            disposed: self.disposed.into_inner(),
            dropped: self.dropped.into_inner(),
        }
    }
}

pub struct Triager {
    classifier: Arc<dyn Classifier>,
    max_age: TimeDelta,
    concurrency: usize,
}

impl Triager {
    pub fn new(classifier: Arc<dyn Classifier>, max_age: TimeDelta, concurrency: usize) -> Self {
        Self {
            classifier,
            max_age,
            concurrency: concurrency.max(1),
        }
    }

    /// Reach a verdict for one message.
    pub async fn decide(&self, message: &ParsedMessage, now: DateTime<Utc>) -> (Verdict, Decision) {
        let label = MessageLabel(message.seq, message.uid);

        if message.age(now) > self.max_age {
            debug!(message = %label, sent_at = %message.sent_at, "Past retention age");
            return (
                Verdict::Dispose {
                    justification: String::new(),
                },
                Decision::AgedOut,
            );
        }

        let request = ClassificationRequest {
            now,
            subject: &message.subject,
            sender: &message.sender,
            sent_at: message.sent_at,
            body: &message.body_text,
        };

        match self.classifier.classify(&request).await {
            Ok(answer) if answer.verdict == KEEP => {
                debug!(message = %label, justification = %answer.justification, "Classifier kept");
                (Verdict::Keep, Decision::Classified)
            }
            Ok(answer) => (
                Verdict::Dispose {
                    justification: answer.justification,
                },
                Decision::Classified,
            ),
            Err(e) => {
                warn!(message = %label, error = %e, "Classification failed, keeping message");
                (Verdict::Keep, Decision::Fallback)
            }
        }
    }

    /// Triage every message from `rx`, up to `concurrency` at a time.
    ///
    /// DISPOSE records go to `dispose_tx`; UIDs of kept messages go straight
    /// to `done_tx`. Output order does not follow input order. Both senders
    /// are dropped when the input is drained.
    pub async fn run(
        self,
        rx: mpsc::Receiver<ParsedMessage>,
        dispose_tx: mpsc::Sender<DispositionRecord>,
        done_tx: mpsc::Sender<Uid>,
    ) -> TriageReport {
        let now = Utc::now();
        let counters = Counters::default();

        ReceiverStream::new(rx)
            .for_each_concurrent(self.concurrency, |message| {
                let counters = &counters;
                let dispose_tx = &dispose_tx;
                let done_tx = &done_tx;
                let this = &self;
                async move {
                    let (verdict, decision) = this.decide(&message, now).await;
                    let label = MessageLabel(message.seq, message.uid);

                    match decision {
                        Decision::AgedOut => Counters::bump(&counters.aged_out),
                        Decision::Classified => Counters::bump(&counters.classified),
                        Decision::Fallback => Counters::bump(&counters.fallbacks),
                    }

                    info!(
                        message = %label,
                        subject = %message.subject,
                        verdict = verdict.label(),
                        justification = verdict.justification(),
                        "Triaged"
                    );

                    match verdict {
                        Verdict::Keep => {
                            let Some(uid) = message.uid else {
                                warn!(message = %label, "Kept message has no UID; not ledgered");
                                Counters::bump(&counters.dropped);
                                return;
                            };
                            Counters::bump(&counters.kept);
                            if done_tx.send(uid).await.is_err() {
                                warn!(message = %label, "Ledger writer gone; verdict lost");
                            }
                        }
                        verdict @ Verdict::Dispose { .. } => {
                            Counters::bump(&counters.disposed);
                            let record = DispositionRecord {
                                message,
                                verdict,
                                decision,
                            };
                            if dispose_tx.send(record).await.is_err() {
                                warn!(message = %label, "Disposer gone; verdict lost");
                            }
                        }
                    }
                }
            })
            .await;

        counters.into_report()
    }
}
