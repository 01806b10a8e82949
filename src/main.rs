use std::sync::Arc;

use anyhow::Context;
use tracing::{Instrument, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

use mail_triage::classify::OpenAiClassifier;
use mail_triage::config::TriageConfig;
use mail_triage::mail::ImapMailbox;
use mail_triage::pipeline::{Pipeline, RunReport};
use mail_triage::store::{DirBackupStore, FileLedger};

/// Directory for a daily-rotated log file, in addition to stderr.
const LOG_DIR_ENV: &str = "MAIL_TRIAGE_LOG_DIR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let _log_guard = init_tracing();

    let config = TriageConfig::from_env().context("Invalid configuration")?;

    eprintln!("📬 mail-triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {}@{}", config.imap.username, config.imap.host);
    eprintln!("   Folder: {}", config.pipeline.folder);
    eprintln!("   Model: {}", config.classifier.model);
    eprintln!("   Backups: {}", config.backup_dir.display());
    eprintln!("   Ledger: {}\n", config.ledger_path.display());

    let span = tracing::info_span!("triage_run", run_id = %Uuid::new_v4());

    match run(config).instrument(span).await {
        Ok(report) => {
            info!(?report, "Done");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Triage run failed");
            Err(e.into())
        }
    }
}

async fn run(config: TriageConfig) -> mail_triage::Result<RunReport> {
    let mailbox = Arc::new(ImapMailbox::connect(&config.imap).await?);
    let classifier = Arc::new(OpenAiClassifier::new(config.classifier)?);
    let backups = Arc::new(DirBackupStore::open(&config.backup_dir).await?);
    let ledger = Arc::new(FileLedger::open(&config.ledger_path).await?);

    let pipeline = Pipeline::new(
        mailbox.clone(),
        classifier,
        backups,
        ledger,
        config.pipeline,
    );
    let result = pipeline.run().await;

    if let Err(e) = mailbox.logout().await {
        warn!(error = %e, "IMAP logout failed");
    }

    Ok(result?)
}

/// stderr logging, plus a daily file when `MAIL_TRIAGE_LOG_DIR` is set.
/// The returned guard flushes the file writer on drop.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match std::env::var(LOG_DIR_ENV).ok().filter(|d| !d.trim().is_empty()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mail-triage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}
