//! Error types for mail-triage.

use std::time::Duration;

/// Top-level error type for a triage run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Only raised while building the client; per-message failures never
    /// leave the Triager.
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifyError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mail-transport (IMAP session) errors.
///
/// `Rejected` and `Unsupported` mean the server answered a single command with
/// NO/BAD; the session is still usable. Everything else means the session is
/// gone and the run has to stop.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IMAP connection closed by server")]
    Closed,

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("IMAP command {command} rejected: {reason}")]
    Rejected { command: String, reason: String },

    #[error("IMAP command {command} not supported by server: {reason}")]
    Unsupported { command: String, reason: String },
}

impl TransportError {
    /// Whether the session survived this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Unsupported { .. })
    }
}

/// Classification service errors. Always downgraded to a KEEP verdict.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Classification request failed: {0}")]
    Http(String),

    #[error("Classification service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Classification timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid classification response: {0}")]
    InvalidResponse(String),
}

/// Per-message decode errors. Fatal to that message only.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Message is not parseable as MIME")]
    Unparseable,
}

/// Backup store and ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No free backup name left for {0}")]
    NamesExhausted(String),
}

/// Errors that end a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Mailbox session failed in {stage}: {source}")]
    Transport {
        stage: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("Ledger write failed: {0}")]
    Ledger(#[from] StorageError),

    #[error("Stage {stage} panicked: {reason}")]
    StagePanicked { stage: &'static str, reason: String },
}

/// Result type alias for mail-triage.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_and_unsupported_are_recoverable() {
        let rejected = TransportError::Rejected {
            command: "UID STORE".into(),
            reason: "NO no such message".into(),
        };
        let unsupported = TransportError::Unsupported {
            command: "UID EXPUNGE".into(),
            reason: "BAD unknown command".into(),
        };
        assert!(rejected.is_recoverable());
        assert!(unsupported.is_recoverable());
    }

    #[test]
    fn session_errors_are_fatal() {
        assert!(!TransportError::Closed.is_recoverable());
        assert!(!TransportError::Protocol("garbage".into()).is_recoverable());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(!TransportError::from(io).is_recoverable());
    }

    #[test]
    fn pipeline_error_names_the_stage() {
        let err = PipelineError::Transport {
            stage: "fetcher",
            source: TransportError::Closed,
        };
        assert_eq!(
            err.to_string(),
            "Mailbox session failed in fetcher: IMAP connection closed by server"
        );
    }
}
