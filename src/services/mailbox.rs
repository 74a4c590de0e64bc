//! Mailbox poller.
//!
//! One call to [`Mailbox::poll`] opens an IMAP session over TLS, selects the
//! inbox, searches with the given criterion, fetches every match and parses it
//! into a [`MessageEnvelope`]. The whole session is bounded by the configured
//! timeout; fetching marks messages as seen on the server.

use async_imap::Session;
use async_native_tls::{TlsConnector, TlsStream};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::TryStreamExt;
use mail_parser::MessageParser;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::MailConfig;
use crate::error::MailboxError;

/// A fetched message, normalised for matching and extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub message_id: String,
    /// Lowercased sender address.
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// Prefix of identifiers built from a sequence number. Those are positional and
/// can point at a different message after an expunge.
pub const SEQUENCE_ID_PREFIX: &str = "seq:";

impl MessageEnvelope {
    /// Whether the id can be remembered across runs.
    pub fn has_stable_id(&self) -> bool {
        !self.message_id.starts_with(SEQUENCE_ID_PREFIX)
    }
}

/// Identifier for a message without a `Message-ID` header.
///
/// UIDs never repeat within one UIDVALIDITY, so `uid:<validity>:<uid>` is safe
/// to remember. Without a UID only the sequence number is left.
pub fn fallback_message_id(uid_validity: Option<u32>, uid: Option<u32>, seq: u32) -> String {
    match (uid_validity, uid) {
        (Some(validity), Some(uid)) => format!("uid:{}:{}", validity, uid),
        _ => format!("{}{}", SEQUENCE_ID_PREFIX, seq),
    }
}

/// Which messages a poll run should pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCriterion {
    /// Recurring job: only messages not yet seen.
    Unseen,
    /// Diagnostic scan: everything received on or after the date.
    Since(NaiveDate),
}

impl SearchCriterion {
    pub fn to_imap_query(&self) -> String {
        match self {
            SearchCriterion::Unseen => "UNSEEN".to_string(),
            SearchCriterion::Since(date) => format!("SINCE {}", date.format("%d-%b-%Y")),
        }
    }
}

#[async_trait]
pub trait Mailbox: Send + Sync {
    async fn poll(&self, criterion: SearchCriterion) -> Result<Vec<MessageEnvelope>, MailboxError>;
}

/// Parse a raw RFC 822 message. Returns `None` when there is no usable sender.
///
/// `fallback_id` is used when the message has no `Message-ID` header.
pub fn parse_envelope(fallback_id: &str, raw: &[u8]) -> Option<MessageEnvelope> {
    let message = MessageParser::default().parse(raw)?;

    let from = message
        .from()
        .and_then(|addresses| addresses.first())
        .and_then(|addr| addr.address())
        .map(|addr| addr.trim().to_lowercase())
        .filter(|addr| !addr.is_empty())?;

    let body = message
        .body_text(0)
        .or_else(|| message.body_html(0))
        .map(|body| body.into_owned())
        .unwrap_or_default();

    Some(MessageEnvelope {
        message_id: message
            .message_id()
            .map(str::to_string)
            .unwrap_or_else(|| fallback_id.to_string()),
        from,
        subject: message.subject().unwrap_or_default().to_string(),
        body,
    })
}

type ImapSession = Session<TlsStream<TcpStream>>;

pub struct ImapMailbox {
    config: MailConfig,
}

impl ImapMailbox {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    async fn connect(&self) -> Result<ImapSession, MailboxError> {
        let tcp = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| MailboxError::Connect(e.to_string()))?;

        let tls = TlsConnector::new()
            .connect(self.config.host.as_str(), tcp)
            .await
            .map_err(|e| MailboxError::Connect(e.to_string()))?;

        let client = async_imap::Client::new(tls);
        client
            .login(&self.config.user, &self.config.password)
            .await
            .map_err(|(e, _client)| MailboxError::Connect(format!("login failed: {}", e)))
    }

    async fn fetch_envelopes(
        session: &mut ImapSession,
        criterion: SearchCriterion,
    ) -> Result<Vec<MessageEnvelope>, MailboxError> {
        let inbox = session
            .select("INBOX")
            .await
            .map_err(|e| protocol("select", e))?;

        let query = criterion.to_imap_query();
        let mut sequence: Vec<u32> = session
            .search(&query)
            .await
            .map_err(|e| protocol("search", e))?
            .into_iter()
            .collect();

        if sequence.is_empty() {
            info!(query = %query, "No new emails found");
            return Ok(Vec::new());
        }
        sequence.sort_unstable();
        info!(count = sequence.len(), query = %query, "Found matching email(s)");

        let set = sequence
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let fetches: Vec<_> = session
            .fetch(&set, "(UID RFC822)")
            .await
            .map_err(|e| protocol("fetch", e))?
            .try_collect()
            .await
            .map_err(|e| protocol("fetch", e))?;

        let mut envelopes = Vec::with_capacity(fetches.len());
        for fetch in &fetches {
            let Some(raw) = fetch.body() else {
                warn!(seq = fetch.message, "Fetched message has no body");
                continue;
            };
            let fallback_id = fallback_message_id(inbox.uid_validity, fetch.uid, fetch.message);
            match parse_envelope(&fallback_id, raw) {
                Some(envelope) => envelopes.push(envelope),
                None => warn!(seq = fetch.message, "Email has no sender address or could not be parsed"),
            }
        }
        Ok(envelopes)
    }

    async fn run_session(&self, criterion: SearchCriterion) -> Result<Vec<MessageEnvelope>, MailboxError> {
        let mut session = self.connect().await?;
        let result = Self::fetch_envelopes(&mut session, criterion).await;

        // Logout on every path; a failed logout only costs the server a dangling session.
        if let Err(e) = session.logout().await {
            debug!(error = %e, "IMAP logout failed");
        }
        result
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn poll(&self, criterion: SearchCriterion) -> Result<Vec<MessageEnvelope>, MailboxError> {
        // On timeout the session future is dropped, which closes the socket.
        match tokio::time::timeout(self.config.timeout, self.run_session(criterion)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = self.config.timeout.as_secs(), "IMAP operation timeout, connection closed");
                Err(MailboxError::Timeout(self.config.timeout))
            }
        }
    }
}

fn protocol(stage: &'static str, err: async_imap::error::Error) -> MailboxError {
    MailboxError::Protocol {
        stage,
        message: err.to_string(),
    }
}
