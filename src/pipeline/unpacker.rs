//! Unpacker: decodes raw messages into `ParsedMessage`s.

use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders, PartType};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::pipeline::types::{MessageLabel, ParsedMessage, RawMessage};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackReport {
    pub parsed: usize,
    pub dropped: usize,
}

/// Decode every message from `rx` and forward it to `out`.
///
/// A message that cannot be decoded is logged and dropped; the stage keeps
/// going. Returns once `rx` is closed and drained, dropping `out`.
pub async fn run(
    mut rx: mpsc::Receiver<RawMessage>,
    out: mpsc::Sender<ParsedMessage>,
) -> UnpackReport {
    let mut report = UnpackReport::default();

    while let Some(raw) = rx.recv().await {
        let label = MessageLabel(raw.seq, raw.uid);
        match unpack(raw) {
            Ok(parsed) => {
                debug!(message = %label, subject = %parsed.subject, "Unpacked");
                report.parsed += 1;
                if out.send(parsed).await.is_err() {
                    warn!("Triager stopped early; abandoning unpack");
                    break;
                }
            }
            Err(e) => {
                warn!(message = %label, error = %e, "Dropping undecodable message");
                report.dropped += 1;
            }
        }
    }

    report
}

/// Decode one raw message. Header fields and the body degrade to empty/zero
/// values; only input the parser rejects outright is an error.
pub fn unpack(raw: RawMessage) -> Result<ParsedMessage, DecodeError> {
    let message = MessageParser::default()
        .parse(raw.raw.as_slice())
        .ok_or(DecodeError::Unparseable)?;

    let sent_at = message
        .date()
        .filter(|d| d.is_valid())
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let sender = message
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address().or(a.name()))
        .unwrap_or_default()
        .to_string();

    let subject = message.subject().unwrap_or_default().to_string();

    let mut plain = String::new();
    let mut html = String::new();

    for (index, part) in message.parts.iter().enumerate() {
        if matches!(part.body, PartType::Multipart(_)) {
            continue;
        }
        if part
            .content_disposition()
            .is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"))
        {
            continue;
        }
        if part.is_encoding_problem {
            warn!(
                message = %MessageLabel(raw.seq, raw.uid),
                part = index,
                "Part failed to decode, skipping"
            );
            continue;
        }

        let text = String::from_utf8_lossy(part.contents());
        if is_html(part) {
            html.push_str(&text);
        } else {
            plain.push_str(&text);
        }
    }

    let body_text = select_body(plain, html);

    Ok(ParsedMessage {
        seq: raw.seq,
        uid: raw.uid,
        sent_at,
        sender,
        subject,
        body_text,
        raw: raw.raw,
    })
}

fn is_html(part: &mail_parser::MessagePart<'_>) -> bool {
    if matches!(part.body, PartType::Html(_)) {
        return true;
    }
    part.content_type().is_some_and(|ct| {
        ct.ctype().eq_ignore_ascii_case("text")
            && ct
                .subtype()
                .is_some_and(|sub| sub.eq_ignore_ascii_case("html"))
    })
}

/// Plain text wins whenever it has a non-whitespace character; otherwise
/// the HTML is used verbatim, even if it is empty too.
pub fn select_body(plain: String, html: String) -> String {
    if plain.trim().is_empty() { html } else { plain }
}
