//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default OpenAI-compatible chat completions endpoint.
pub const DEFAULT_CLASSIFIER_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default classification model.
pub const DEFAULT_MODEL: &str = "gpt-5-nano-2025-08-07";

/// Three years, the default age after which mail is disposed without classification.
pub const DEFAULT_MAX_AGE_DAYS: i64 = 3 * 365;

/// IMAP connection settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

/// Classification service settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub api_key: SecretString,
    pub model: String,
    pub timeout: Duration,
    /// Mailbox owner's name, used to personalise the prompt.
    pub owner: String,
}

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Folder to triage.
    pub folder: String,
    /// Maximum messages fetched per run.
    pub max_messages: u32,
    /// Messages older than this are disposed without a classification call.
    pub max_age: chrono::TimeDelta,
    /// Number of concurrent classification workers.
    pub concurrency: usize,
    /// Capacity of every inter-stage queue.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            folder: "INBOX".to_string(),
            max_messages: 10,
            max_age: chrono::TimeDelta::days(DEFAULT_MAX_AGE_DAYS),
            concurrency: 4,
            queue_capacity: 50,
        }
    }
}

/// Everything a triage run needs, assembled once at startup.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub imap: ImapConfig,
    pub classifier: ClassifierConfig,
    pub pipeline: PipelineConfig,
    pub backup_dir: PathBuf,
    pub ledger_path: PathBuf,
}

impl TriageConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = PipelineConfig::default();

        let imap = ImapConfig {
            host: env.required("EMAIL_IMAP_HOST")?,
            port: env.parsed("EMAIL_IMAP_PORT", 993)?,
            username: env.required("EMAIL_USERNAME")?,
            password: SecretString::from(env.required("EMAIL_PASSWORD")?),
        };

        let classifier = ClassifierConfig {
            endpoint: env.string("MAIL_TRIAGE_CLASSIFIER_URL", DEFAULT_CLASSIFIER_URL),
            api_key: SecretString::from(env.required("OPENAI_API_KEY")?),
            model: env.string("MAIL_TRIAGE_MODEL", DEFAULT_MODEL),
            timeout: Duration::from_secs(env.positive("MAIL_TRIAGE_CLASSIFIER_TIMEOUT_SECS", 30)?),
            owner: env.string("MAIL_TRIAGE_OWNER", ""),
        };

        let max_age_days: i64 = env.parsed("MAIL_TRIAGE_MAX_AGE_DAYS", DEFAULT_MAX_AGE_DAYS)?;
        if max_age_days < 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAIL_TRIAGE_MAX_AGE_DAYS".into(),
                message: "must not be negative".into(),
            });
        }

        let pipeline = PipelineConfig {
            folder: env.string("MAIL_TRIAGE_FOLDER", &defaults.folder),
            max_messages: env.positive("MAIL_TRIAGE_MAX_MESSAGES", defaults.max_messages)?,
            max_age: chrono::TimeDelta::days(max_age_days),
            concurrency: env.positive("MAIL_TRIAGE_CONCURRENCY", defaults.concurrency)?,
            queue_capacity: env.positive("MAIL_TRIAGE_QUEUE_CAPACITY", defaults.queue_capacity)?,
        };

        Ok(Self {
            imap,
            classifier,
            pipeline,
            backup_dir: PathBuf::from(env.string("MAIL_TRIAGE_BACKUP_DIR", "./email_backups")),
            ledger_path: PathBuf::from(env.string("MAIL_TRIAGE_LEDGER_PATH", "./checked_emails.txt")),
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
        }
    }

    fn positive<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialEq + Default,
        T::Err: std::fmt::Display,
    {
        let value = self.parsed(key, default)?;
        if value == T::default() {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(value)
    }
}
