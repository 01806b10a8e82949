//! Classification service client: asks an OpenAI-compatible chat model
//! whether a message is worth keeping.
//!
//! The client only reports what the model said. Turning that into a
//! verdict, including the keep-on-failure policy, is the Triager's job.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::error::ClassifyError;

/// Message body is truncated to this many characters before it is sent.
const MAX_BODY_CHARS: usize = 4000;

/// How much of an error body to keep in `ClassifyError::Status`.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// What the classifier gets to see of a message.
#[derive(Debug, Clone)]
pub struct ClassificationRequest<'a> {
    pub now: DateTime<Utc>,
    pub subject: &'a str,
    pub sender: &'a str,
    pub sent_at: DateTime<Utc>,
    pub body: &'a str,
}

/// Raw answer from the service: verdict string plus a short rationale.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Classification {
    #[serde(rename = "classification")]
    pub verdict: String,
    #[serde(default)]
    pub justification: String,
}

/// A request/response classification service.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        request: &ClassificationRequest<'_>,
    ) -> Result<Classification, ClassifyError>;
}

// ── OpenAI-compatible client ────────────────────────────────────────

/// Chat-completions classifier.
pub struct OpenAiClassifier {
    client: reqwest::Client,
    config: ClassifierConfig,
}

impl OpenAiClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifyError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifyError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(
        &self,
        request: &ClassificationRequest<'_>,
    ) -> Result<Classification, ClassifyError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": build_system_prompt(&self.config.owner) },
                { "role": "user", "content": build_user_prompt(request) },
            ],
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        let completion: ChatCompletion = serde_json::from_str(&text)
            .map_err(|e| ClassifyError::InvalidResponse(format!("completion body: {e}")))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ClassifyError::InvalidResponse("no choices in completion".into()))?;

        debug!(model = %self.config.model, raw = %content, "Classifier answered");
        parse_classification(&content)
    }
}

impl OpenAiClassifier {
    fn transport_error(&self, e: reqwest::Error) -> ClassifyError {
        if e.is_timeout() {
            ClassifyError::Timeout(self.timeout())
        } else {
            ClassifyError::Http(e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_system_prompt(owner: &str) -> String {
    let whose = if owner.trim().is_empty() {
        "the user's".to_string()
    } else {
        format!("{}'s", owner.trim())
    };

    format!(
        "You are {whose} personal assistant, cleaning up their mailbox. \
         Rate each email: keep it or delete it.\n\n\
         Delete emails that will not matter in the future: ads, spam, newsletters, \
         outdated information such as one-time authentication codes, and outdated \
         automated notifications.\n\
         Keep emails that might need follow-up: upcoming or very recent events, \
         bills, invoices, contracts, personal correspondence.\n\
         If you are not totally sure, keep the email.\n\n\
         Respond with ONLY a JSON object:\n\
         {{\"classification\": \"KEEP\" or \"DELETE\", \
         \"justification\": \"one short sentence explaining the decision\"}}"
    )
}

fn build_user_prompt(request: &ClassificationRequest<'_>) -> String {
    let body: String = request.body.chars().take(MAX_BODY_CHARS).collect();
    format!(
        "Today's date: {}\n\
         Email title: {}\n\
         Email sender: {}\n\
         Date: {}\n\
         Email content:\n{}",
        request.now.format("%Y-%m-%d"),
        request.subject,
        request.sender,
        request.sent_at.to_rfc2822(),
        body
    )
}

// ── Response parsing ────────────────────────────────────────────────

/// Parse the model's message content into a `Classification`.
pub fn parse_classification(raw: &str) -> Result<Classification, ClassifyError> {
    let json = extract_json_object(raw);
    let parsed: Classification = serde_json::from_str(&json)
        .map_err(|e| ClassifyError::InvalidResponse(format!("classification JSON: {e}")))?;
    Ok(Classification {
        verdict: parsed.verdict.trim().to_string(),
        justification: parsed.justification.trim().to_string(),
    })
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
