//! IMAP connector: raw IMAP4rev1 over TLS via rustls.
//!
//! `ImapSession` is a blocking, tagged-command client generic over any
//! `Read + Write` stream. `ImapMailbox` shares one session behind a mutex and
//! runs every command on the blocking pool, which is what serialises the
//! Fetcher's reads and the Disposer's deletes on the single connection.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rustls_pki_types::ServerName;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, trace};

use crate::config::ImapConfig;
use crate::error::TransportError;
use crate::mail::{FetchedMessage, MailTransport, Uid};

/// Socket read timeout. Large bulk fetches need headroom.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// The production stream type.
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    No,
    Bad,
}

/// One logical response line, with any `{n}` literals it carried.
#[derive(Debug, Default)]
struct ResponseLine {
    text: String,
    literals: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct Response {
    untagged: Vec<ResponseLine>,
    status: Status,
    detail: String,
}

impl Response {
    fn into_ok(self, command: &str) -> Result<Vec<ResponseLine>, TransportError> {
        match self.status {
            Status::Ok => Ok(self.untagged),
            Status::No | Status::Bad => Err(TransportError::Rejected {
                command: command.to_string(),
                reason: self.detail,
            }),
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// Blocking IMAP session.
pub struct ImapSession<S: Read + Write> {
    stream: BufReader<S>,
    tag_counter: u32,
    exists: u32,
}

impl<S: Read + Write> ImapSession<S> {
    /// Wrap a connected stream and consume the server greeting.
    pub fn new(stream: S) -> Result<Self, TransportError> {
        let mut session = Self {
            stream: BufReader::new(stream),
            tag_counter: 0,
            exists: 0,
        };

        let greeting = session.read_response_line()?;
        if greeting.text.starts_with("* OK") || greeting.text.starts_with("* PREAUTH") {
            Ok(session)
        } else if greeting.text.starts_with("* BYE") {
            Err(TransportError::Closed)
        } else {
            Err(TransportError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.text
            )))
        }
    }

    pub fn login(&mut self, username: &str, password: &SecretString) -> Result<(), TransportError> {
        let cmd = format!(
            "LOGIN {} {}",
            quote(username),
            quote(password.expose_secret())
        );
        self.command(&cmd)?.into_ok("LOGIN")?;
        Ok(())
    }

    /// Select a folder, returning its message count.
    pub fn select(&mut self, folder: &str) -> Result<u32, TransportError> {
        let untagged = self
            .command(&format!("SELECT {}", quote(folder)))?
            .into_ok("SELECT")?;

        let exists = untagged
            .iter()
            .find_map(|line| parse_exists(&line.text))
            .ok_or_else(|| TransportError::Protocol("SELECT response without EXISTS".into()))?;

        self.exists = exists;
        Ok(exists)
    }

    /// Fetch UID and full body for the first `max_count` messages of the
    /// selected folder whose UID is not in `exclude`. `BODY.PEEK` leaves
    /// `\Seen` untouched.
    pub fn fetch(
        &mut self,
        max_count: u32,
        exclude: &HashSet<Uid>,
    ) -> Result<Vec<FetchedMessage>, TransportError> {
        if self.exists == 0 || max_count == 0 {
            return Ok(Vec::new());
        }

        let listing = self.command("FETCH 1:* (UID)")?.into_ok("FETCH")?;
        let mut seqs: Vec<u32> = listing
            .into_iter()
            .filter_map(parse_fetch)
            .filter(|m| m.uid.is_none_or(|uid| !exclude.contains(&uid)))
            .map(|m| m.seq)
            .collect();
        seqs.sort_unstable();
        seqs.dedup();
        seqs.truncate(max_count as usize);

        debug!(
            exists = self.exists,
            excluded = exclude.len(),
            selected = seqs.len(),
            "Fetch window chosen"
        );
        if seqs.is_empty() {
            return Ok(Vec::new());
        }

        let set = seqs
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let untagged = self
            .command(&format!("FETCH {set} (UID BODY.PEEK[])"))?
            .into_ok("FETCH")?;

        Ok(untagged.into_iter().filter_map(parse_fetch).collect())
    }

    pub fn uid_store_deleted(&mut self, uid: Uid) -> Result<(), TransportError> {
        self.command(&format!("UID STORE {uid} +FLAGS.SILENT (\\Deleted)"))?
            .into_ok("UID STORE")?;
        Ok(())
    }

    /// `UID EXPUNGE` needs UIDPLUS (or IMAP4rev2); a rejection is reported as
    /// `Unsupported` so the caller can degrade to flag-only.
    pub fn uid_expunge(&mut self, uid: Uid) -> Result<(), TransportError> {
        let response = self.command(&format!("UID EXPUNGE {uid}"))?;
        match response.status {
            Status::Ok => Ok(()),
            Status::No | Status::Bad => Err(TransportError::Unsupported {
                command: "UID EXPUNGE".into(),
                reason: response.detail,
            }),
        }
    }

    pub fn logout(&mut self) -> Result<(), TransportError> {
        self.command("LOGOUT")?.into_ok("LOGOUT")?;
        Ok(())
    }

    // ── Wire helpers ────────────────────────────────────────────────

    fn command(&mut self, command: &str) -> Result<Response, TransportError> {
        self.tag_counter += 1;
        let tag = format!("A{:04}", self.tag_counter);
        let verb = command.split_whitespace().next().unwrap_or_default();
        trace!(tag = %tag, verb, "IMAP command");

        let stream = self.stream.get_mut();
        stream.write_all(format!("{tag} {command}\r\n").as_bytes())?;
        stream.flush()?;

        let mut untagged = Vec::new();
        loop {
            let line = self.read_response_line()?;
            if let Some(rest) = line
                .text
                .strip_prefix(tag.as_str())
                .and_then(|r| r.strip_prefix(' '))
            {
                let (status, detail) = parse_status(rest)?;
                return Ok(Response {
                    untagged,
                    status,
                    detail,
                });
            }
            if line.text.starts_with("* ") {
                untagged.push(line);
                continue;
            }
            return Err(TransportError::Protocol(format!(
                "unexpected line in {verb} response: {}",
                line.text
            )));
        }
    }

    /// Read one response line, pulling in every literal it announces.
    fn read_response_line(&mut self) -> Result<ResponseLine, TransportError> {
        let mut line = ResponseLine::default();
        loop {
            let mut raw = Vec::new();
            if self.stream.read_until(b'\n', &mut raw)? == 0 {
                return Err(TransportError::Closed);
            }
            let text = String::from_utf8_lossy(&raw);
            let text = text.trim_end_matches(['\r', '\n']);
            line.text.push_str(text);

            match literal_size(text) {
                Some(size) => {
                    let mut literal = vec![0u8; size];
                    self.stream.read_exact(&mut literal)?;
                    line.literals.push(literal);
                }
                None => return Ok(line),
            }
        }
    }
}

/// Open a TLS connection and read the greeting (blocking).
pub fn connect_tls(config: &ImapConfig) -> Result<ImapSession<TlsStream>, TransportError> {
    let tcp = TcpStream::connect((config.host.as_str(), config.port))?;
    tcp.set_read_timeout(Some(READ_TIMEOUT))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| TransportError::Tls(format!("invalid server name: {e}")))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| TransportError::Tls(e.to_string()))?;

    ImapSession::new(rustls::StreamOwned::new(conn, tcp))
}

// ── Async adapter ───────────────────────────────────────────────────

/// Shared IMAP session implementing [`MailTransport`].
pub struct ImapMailbox<S: Read + Write> {
    session: Arc<Mutex<ImapSession<S>>>,
}

impl ImapMailbox<TlsStream> {
    /// Connect over TLS and log in.
    pub async fn connect(config: &ImapConfig) -> Result<Self, TransportError> {
        let cfg = config.clone();
        let session = tokio::task::spawn_blocking(move || {
            let mut session = connect_tls(&cfg)?;
            session.login(&cfg.username, &cfg.password)?;
            Ok::<_, TransportError>(session)
        })
        .await
        .map_err(|e| TransportError::Protocol(format!("IMAP connect task failed: {e}")))??;

        info!(host = %config.host, user = %config.username, "Logged in to IMAP server");
        Ok(Self::new(session))
    }
}

impl<S> ImapMailbox<S>
where
    S: Read + Write + Send + 'static,
{
    pub fn new(session: ImapSession<S>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
        }
    }

    pub async fn logout(&self) -> Result<(), TransportError> {
        self.with_session(|s| s.logout()).await
    }

    /// Run one blocking operation with exclusive access to the session.
    async fn with_session<T, F>(&self, op: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession<S>) -> Result<T, TransportError> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| TransportError::Protocol("IMAP session lock poisoned".into()))?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| TransportError::Protocol(format!("IMAP task failed: {e}")))?
    }
}

#[async_trait]
impl<S> MailTransport for ImapMailbox<S>
where
    S: Read + Write + Send + 'static,
{
    async fn select_folder(&self, folder: &str) -> Result<u32, TransportError> {
        let folder = folder.to_string();
        let exists = self.with_session(move |s| s.select(&folder)).await?;
        debug!(exists, "Folder selected");
        Ok(exists)
    }

    async fn fetch_raw(
        &self,
        max_count: u32,
        exclude: &HashSet<Uid>,
    ) -> Result<Vec<FetchedMessage>, TransportError> {
        let exclude = exclude.clone();
        self.with_session(move |s| s.fetch(max_count, &exclude)).await
    }

    async fn mark_deleted(&self, uid: Uid) -> Result<(), TransportError> {
        self.with_session(move |s| s.uid_store_deleted(uid)).await
    }

    async fn expunge(&self, uid: Uid) -> Result<(), TransportError> {
        self.with_session(move |s| s.uid_expunge(uid)).await
    }
}

// ── Parsing helpers ─────────────────────────────────────────────────

/// Quote a string for use as an IMAP quoted-string argument.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Size of the literal announced at the end of a line (`{123}` or `{123+}`).
fn literal_size(text: &str) -> Option<usize> {
    let rest = text.strip_suffix('}')?;
    let open = rest.rfind('{')?;
    rest[open + 1..].trim_end_matches('+').parse().ok()
}

fn parse_status(rest: &str) -> Result<(Status, String), TransportError> {
    let (word, detail) = rest.split_once(' ').unwrap_or((rest, ""));
    let status = match word.to_ascii_uppercase().as_str() {
        "OK" => Status::Ok,
        "NO" => Status::No,
        "BAD" => Status::Bad,
        other => {
            return Err(TransportError::Protocol(format!(
                "unknown response status: {other}"
            )));
        }
    };
    Ok((status, format!("{word} {detail}").trim().to_string()))
}

/// `* 23 EXISTS` → 23.
fn parse_exists(text: &str) -> Option<u32> {
    let rest = text.strip_prefix("* ")?;
    let (count, keyword) = rest.split_once(' ')?;
    if keyword.trim().eq_ignore_ascii_case("EXISTS") {
        count.parse().ok()
    } else {
        None
    }
}

fn parse_uid(text: &str) -> Option<Uid> {
    let mut tokens = text
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .filter(|t| !t.is_empty());
    while let Some(token) = tokens.next() {
        if token.eq_ignore_ascii_case("UID") {
            return tokens.next().and_then(|n| n.parse().ok()).map(Uid);
        }
    }
    None
}

/// Turn a `* n FETCH (...)` response into a `FetchedMessage`. Unsolicited
/// FETCH responses (flag updates) carry neither UID nor body and are ignored.
fn parse_fetch(line: ResponseLine) -> Option<FetchedMessage> {
    let rest = line.text.strip_prefix("* ")?;
    let (seq, items) = rest.split_once(' ')?;
    let items = items.to_ascii_uppercase();
    if !items.starts_with("FETCH") {
        return None;
    }
    let seq: u32 = seq.parse().ok()?;

    let has_body = items.contains("BODY[]");
    let uid = parse_uid(&items["FETCH".len()..]);
    if !has_body && uid.is_none() {
        return None;
    }

    let body = if has_body {
        line.literals.into_iter().next()
    } else {
        None
    };

    Some(FetchedMessage { seq, uid, body })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// In-memory server: replays a canned byte script, records what the client wrote.
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn scripted(script: &str) -> (ScriptedStream, Arc<Mutex<Vec<u8>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let stream = ScriptedStream {
            input: Cursor::new(script.as_bytes().to_vec()),
            written: Arc::clone(&written),
        };
        (stream, written)
    }

    fn sent(written: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(written.lock().unwrap().clone()).unwrap()
    }

    // ── Helper tests ────────────────────────────────────────────────

    #[test]
    fn literal_size_variants() {
        assert_eq!(literal_size("* 1 FETCH (BODY[] {42}"), Some(42));
        assert_eq!(literal_size("* 1 FETCH (BODY[] {7+}"), Some(7));
        assert_eq!(literal_size("* 1 FETCH (UID 3)"), None);
        assert_eq!(literal_size("* OK {not a number}"), None);
    }

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(quote("INBOX"), "\"INBOX\"");
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }

    #[test]
    fn exists_parsing() {
        assert_eq!(parse_exists("* 17 EXISTS"), Some(17));
        assert_eq!(parse_exists("* 0 RECENT"), None);
        assert_eq!(parse_exists("* OK [UIDVALIDITY 3857529045]"), None);
    }

    #[test]
    fn uid_parsing() {
        assert_eq!(parse_uid(" (UID 4827 BODY[] {10})"), Some(Uid(4827)));
        assert_eq!(parse_uid(" (BODY[] {3} UID 9)"), Some(Uid(9)));
        assert_eq!(parse_uid(" (FLAGS (\\Seen))"), None);
    }

    #[test]
    fn unsolicited_flag_fetch_ignored() {
        let line = ResponseLine {
            text: "* 3 FETCH (FLAGS (\\Seen))".into(),
            literals: vec![],
        };
        assert!(parse_fetch(line).is_none());
    }

    // ── Session tests ───────────────────────────────────────────────

    #[test]
    fn login_select_fetch_roundtrip() {
        let script = concat!(
            "* OK IMAP4rev1 ready\r\n",
            "A0001 OK LOGIN completed\r\n",
            "* 2 EXISTS\r\n",
            "* 0 RECENT\r\n",
            "* OK [UIDVALIDITY 1] UIDs valid\r\n",
            "A0002 OK [READ-WRITE] SELECT completed\r\n",
            "* 1 FETCH (UID 41)\r\n",
            "* 2 FETCH (UID 42)\r\n",
            "A0003 OK FETCH completed\r\n",
            "* 1 FETCH (UID 41 BODY[] {4}\r\n",
            "Hi\r\n",
            ")\r\n",
            "* 2 FETCH (BODY[] {3}\r\n",
            "abc UID 42)\r\n",
            "A0004 OK FETCH completed\r\n",
        );
        let (stream, written) = scripted(script);
        let mut session = ImapSession::new(stream).unwrap();

        session
            .login("florian@example.com", &SecretString::from("s3cret"))
            .unwrap();
        assert_eq!(session.select("INBOX").unwrap(), 2);

        let fetched = session.fetch(10, &HashSet::new()).unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].seq, 1);
        assert_eq!(fetched[0].uid, Some(Uid(41)));
        assert_eq!(fetched[0].body.as_deref(), Some(&b"Hi\r\n"[..]));
        assert_eq!(fetched[1].uid, Some(Uid(42)));
        assert_eq!(fetched[1].body.as_deref(), Some(&b"abc"[..]));

        let sent = sent(&written);
        assert!(sent.contains("A0001 LOGIN \"florian@example.com\" \"s3cret\"\r\n"));
        assert!(sent.contains("A0002 SELECT \"INBOX\"\r\n"));
        assert!(sent.contains("A0003 FETCH 1:* (UID)\r\n"));
        assert!(sent.contains("A0004 FETCH 1,2 (UID BODY.PEEK[])\r\n"));
    }

    #[test]
    fn fetch_window_is_bounded() {
        let mut script = String::from("* OK ready\r\n* 500 EXISTS\r\nA0001 OK SELECT completed\r\n");
        for seq in 1..=500 {
            script.push_str(&format!("* {seq} FETCH (UID {})\r\n", seq + 1000));
        }
        script.push_str("A0002 OK FETCH completed\r\nA0003 OK FETCH completed\r\n");

        let (stream, written) = scripted(&script);
        let mut session = ImapSession::new(stream).unwrap();
        assert_eq!(session.select("INBOX").unwrap(), 500);
        session.fetch(3, &HashSet::new()).unwrap();
        assert!(sent(&written).contains("A0003 FETCH 1,2,3 (UID BODY.PEEK[])"));
    }

    #[test]
    fn fetch_window_skips_excluded_uids() {
        let script = concat!(
            "* OK ready\r\n",
            "* 4 EXISTS\r\n",
            "A0001 OK SELECT\r\n",
            "* 1 FETCH (UID 10)\r\n",
            "* 2 FETCH (UID 11)\r\n",
            "* 3 FETCH (UID 12)\r\n",
            "* 4 FETCH (UID 13)\r\n",
            "A0002 OK FETCH\r\n",
            "* 3 FETCH (UID 12 BODY[] {2}\r\n",
            "hi)\r\n",
            "* 4 FETCH (UID 13 BODY[] {2}\r\n",
            "yo)\r\n",
            "A0003 OK FETCH\r\n",
        );
        let (stream, written) = scripted(script);
        let mut session = ImapSession::new(stream).unwrap();
        session.select("INBOX").unwrap();

        let exclude = HashSet::from([Uid(10), Uid(11)]);
        let fetched = session.fetch(2, &exclude).unwrap();
        assert_eq!(
            fetched.iter().map(|m| m.uid).collect::<Vec<_>>(),
            vec![Some(Uid(12)), Some(Uid(13))]
        );
        assert!(sent(&written).contains("A0003 FETCH 3,4 (UID BODY.PEEK[])"));
    }

    #[test]
    fn fully_excluded_folder_fetches_no_bodies() {
        let script = concat!(
            "* OK ready\r\n",
            "* 1 EXISTS\r\n",
            "A0001 OK SELECT\r\n",
            "* 1 FETCH (UID 10)\r\n",
            "A0002 OK FETCH\r\n",
        );
        let (stream, written) = scripted(script);
        let mut session = ImapSession::new(stream).unwrap();
        session.select("INBOX").unwrap();

        assert!(session.fetch(5, &HashSet::from([Uid(10)])).unwrap().is_empty());
        assert!(!sent(&written).contains("BODY.PEEK"));
    }

    #[test]
    fn fetch_on_empty_folder_sends_nothing() {
        let script = concat!("* OK ready\r\n", "* 0 EXISTS\r\n", "A0001 OK SELECT\r\n");
        let (stream, written) = scripted(script);
        let mut session = ImapSession::new(stream).unwrap();
        assert_eq!(session.select("INBOX").unwrap(), 0);
        assert!(session.fetch(10, &HashSet::new()).unwrap().is_empty());
        assert!(!sent(&written).contains("FETCH"));
    }

    #[test]
    fn fetch_without_literal_has_no_body() {
        let script = concat!(
            "* OK ready\r\n",
            "* 1 EXISTS\r\n",
            "A0001 OK SELECT\r\n",
            "* 1 FETCH (UID 7)\r\n",
            "A0002 OK FETCH\r\n",
            "* 1 FETCH (UID 7 BODY[] NIL)\r\n",
            "A0003 OK FETCH\r\n",
        );
        let (stream, _) = scripted(script);
        let mut session = ImapSession::new(stream).unwrap();
        session.select("INBOX").unwrap();
        let fetched = session.fetch(10, &HashSet::new()).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].uid, Some(Uid(7)));
        assert!(fetched[0].body.is_none());
    }

    #[test]
    fn login_rejected() {
        let script = concat!("* OK ready\r\n", "A0001 NO [AUTHENTICATIONFAILED] nope\r\n");
        let (stream, _) = scripted(script);
        let mut session = ImapSession::new(stream).unwrap();
        let err = session
            .login("u", &SecretString::from("p"))
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected { ref command, .. } if command == "LOGIN"));
    }

    #[test]
    fn store_and_expunge() {
        let script = concat!(
            "* OK ready\r\n",
            "A0001 OK STORE completed\r\n",
            "* 1 EXPUNGE\r\n",
            "A0002 OK EXPUNGE completed\r\n",
        );
        let (stream, written) = scripted(script);
        let mut session = ImapSession::new(stream).unwrap();
        session.uid_store_deleted(Uid(99)).unwrap();
        session.uid_expunge(Uid(99)).unwrap();

        let sent = sent(&written);
        assert!(sent.contains("A0001 UID STORE 99 +FLAGS.SILENT (\\Deleted)\r\n"));
        assert!(sent.contains("A0002 UID EXPUNGE 99\r\n"));
    }

    #[test]
    fn expunge_rejection_is_unsupported() {
        let script = concat!("* OK ready\r\n", "A0001 BAD Unknown command UID EXPUNGE\r\n");
        let (stream, _) = scripted(script);
        let mut session = ImapSession::new(stream).unwrap();
        let err = session.uid_expunge(Uid(5)).unwrap_err();
        assert!(matches!(err, TransportError::Unsupported { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn closed_connection_is_fatal() {
        let (stream, _) = scripted("* OK ready\r\n");
        let mut session = ImapSession::new(stream).unwrap();
        let err = session.select("INBOX").unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn bye_greeting_refused() {
        let (stream, _) = scripted("* BYE too many connections\r\n");
        assert!(matches!(
            ImapSession::new(stream),
            Err(TransportError::Closed)
        ));
    }

    // ── Async adapter ───────────────────────────────────────────────

    #[tokio::test]
    async fn mailbox_drives_session_through_trait() {
        let script = concat!(
            "* OK ready\r\n",
            "* 1 EXISTS\r\n",
            "A0001 OK SELECT\r\n",
            "* 1 FETCH (UID 12)\r\n",
            "A0002 OK FETCH\r\n",
            "* 1 FETCH (UID 12 BODY[] {5}\r\n",
            "hello)\r\n",
            "A0003 OK FETCH\r\n",
            "A0004 OK STORE\r\n",
            "A0005 NO UIDPLUS not advertised\r\n",
        );
        let (stream, _) = scripted(script);
        let mailbox = ImapMailbox::new(ImapSession::new(stream).unwrap());

        assert_eq!(mailbox.select_folder("INBOX").await.unwrap(), 1);
        let fetched = mailbox.fetch_raw(10, &HashSet::new()).await.unwrap();
        assert_eq!(fetched[0].uid, Some(Uid(12)));
        mailbox.mark_deleted(Uid(12)).await.unwrap();
        let err = mailbox.expunge(Uid(12)).await.unwrap_err();
        assert!(matches!(err, TransportError::Unsupported { .. }));
    }
}
