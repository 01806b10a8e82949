//! Shared types for the triage pipeline.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::mail::Uid;

// ── Messages ────────────────────────────────────────────────────────

/// A message as pulled off the server. Owned by whichever stage holds it.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Position in this run's folder snapshot. Routing/logging only.
    pub seq: u32,
    /// Stable identifier; absent for malformed fetches.
    pub uid: Option<Uid>,
    pub raw: Vec<u8>,
}

/// A decoded message.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub seq: u32,
    pub uid: Option<Uid>,
    /// Unix epoch when the Date header is missing or unparseable.
    pub sent_at: DateTime<Utc>,
    /// Best-effort sender address; empty if absent.
    pub sender: String,
    /// Empty if absent.
    pub subject: String,
    /// Plain text if it has any non-whitespace, else the HTML verbatim.
    pub body_text: String,
    /// Original bytes, kept for the backup.
    pub raw: Vec<u8>,
}

impl ParsedMessage {
    /// Age relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::TimeDelta {
        now.signed_duration_since(self.sent_at)
    }
}

/// Short label for log lines: `uid=42` or `seq=3` when there is no UID.
pub struct MessageLabel(pub u32, pub Option<Uid>);

impl fmt::Display for MessageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.1 {
            Some(uid) => write!(f, "uid={uid}"),
            None => write!(f, "seq={} (no uid)", self.0),
        }
    }
}

// ── Verdict ─────────────────────────────────────────────────────────

/// Triage outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    /// `justification` is non-empty only when the classifier decided.
    Dispose { justification: String },
}

impl Verdict {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Dispose { .. } => "dispose",
        }
    }

    pub fn justification(&self) -> &str {
        match self {
            Self::Keep => "",
            Self::Dispose { justification } => justification,
        }
    }
}

/// How the Triager reached its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Older than the age threshold; no classification call.
    AgedOut,
    /// The classifier answered.
    Classified,
    /// The classifier failed; kept by default.
    Fallback,
}

impl Decision {
    pub fn label(self) -> &'static str {
        match self {
            Self::AgedOut => "aged_out",
            Self::Classified => "classified",
            Self::Fallback => "fallback",
        }
    }
}

/// A parsed message paired with its verdict.
#[derive(Debug, Clone)]
pub struct DispositionRecord {
    pub message: ParsedMessage,
    pub verdict: Verdict,
    pub decision: Decision,
}

// ── Run report ──────────────────────────────────────────────────────

/// Counters for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Messages the server returned.
    pub fetched: usize,
    /// Messages skipped before parsing (no body, or already ledgered).
    pub skipped: usize,
    pub parsed: usize,
    /// Messages dropped without reaching the ledger (undecodable, no UID,
    /// failed backup, failed delete).
    pub dropped: usize,
    pub aged_out: usize,
    pub classified: usize,
    /// Classifier failures resolved as KEEP.
    pub fallbacks: usize,
    pub kept: usize,
    pub disposed: usize,
    pub backup_failures: usize,
    /// Deletes that stopped at flag-only because expunge was unavailable.
    pub degraded_deletes: usize,
    pub ledgered: usize,
}
