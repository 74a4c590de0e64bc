//! Ingestion orchestrator.
//!
//! Each fetched message walks an explicit state machine:
//!
//! ```text
//! Fetched ─► DedupCheck ─► Match ─► Extract ─► Persist ─► (Complete)
//!    │           │           ├─► (Dropped: unknown vendor / no open request)
//!    │           │           └─► (Skipped: already ingested)
//!    │           └─► (Skipped: duplicate)
//!    └─► (Skipped: subject filtered)          Extract ─► (Failed)
//! ```
//!
//! The decision at every step is a plain function of what the previous effect
//! observed, so the transitions can be exercised without a mail session.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entities::{request, vendor};
use crate::error::{IngestError, MailboxError, StoreError};
use crate::services::extraction::{ExtractionClient, StructuredProposal};
use crate::services::ledger::DedupLedger;
use crate::services::mailbox::{Mailbox, MessageEnvelope, SearchCriterion};
use crate::services::matcher::{MatchOutcome, Matcher, SubjectFilter};
use crate::services::store::{NewProposal, ProcurementStore};

#[derive(Debug, Clone, PartialEq)]
pub enum MessageState {
    Fetched,
    DedupCheck,
    Match,
    Extract {
        request: request::Model,
        vendor: vendor::Model,
    },
    Persist {
        request_id: Uuid,
        vendor_id: Uuid,
        proposal: StructuredProposal,
    },
    Done(MessageOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Subject rejected by the configured filter.
    Filtered,
    /// The ledger already saw this message id.
    Duplicate,
    /// A proposal for the (request, vendor) pair exists. `None` when the storage
    /// constraint caught it rather than the matcher.
    AlreadyIngested { proposal_id: Option<Uuid> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnknownVendor,
    NoOpenRequest,
}

/// Terminal state of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Complete { proposal_id: Uuid },
    Skipped(SkipReason),
    Dropped(DropReason),
    Failed(String),
}

impl MessageOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            MessageOutcome::Complete { .. } => "complete",
            MessageOutcome::Skipped(_) => "skipped",
            MessageOutcome::Dropped(_) => "dropped",
            MessageOutcome::Failed(_) => "failed",
        }
    }

    /// Whether the ledger should remember the message.
    fn settles_message(&self) -> bool {
        matches!(
            self,
            MessageOutcome::Complete { .. } | MessageOutcome::Skipped(SkipReason::AlreadyIngested { .. })
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Filtered => write!(f, "subject does not look like an RFP reply"),
            SkipReason::Duplicate => write!(f, "message already processed"),
            SkipReason::AlreadyIngested { .. } => write!(f, "proposal already exists"),
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::UnknownVendor => write!(f, "sender is not a known vendor"),
            DropReason::NoOpenRequest => write!(f, "no sent request for this vendor"),
        }
    }
}

pub fn after_fetch(filter: SubjectFilter, subject: &str) -> MessageState {
    if filter.accepts(subject) {
        MessageState::DedupCheck
    } else {
        MessageState::Done(MessageOutcome::Skipped(SkipReason::Filtered))
    }
}

pub fn after_dedup(should_process: bool) -> MessageState {
    if should_process {
        MessageState::Match
    } else {
        MessageState::Done(MessageOutcome::Skipped(SkipReason::Duplicate))
    }
}

pub fn after_match(outcome: MatchOutcome) -> MessageState {
    match outcome {
        MatchOutcome::Matched { request, vendor } => MessageState::Extract { request, vendor },
        MatchOutcome::UnknownVendor => MessageState::Done(MessageOutcome::Dropped(DropReason::UnknownVendor)),
        MatchOutcome::NoOpenRequest { .. } => {
            MessageState::Done(MessageOutcome::Dropped(DropReason::NoOpenRequest))
        }
        MatchOutcome::AlreadyIngested { proposal_id, .. } => {
            MessageState::Done(MessageOutcome::Skipped(SkipReason::AlreadyIngested {
                proposal_id: Some(proposal_id),
            }))
        }
    }
}

/// A uniqueness violation on insert means a concurrent run got there first.
pub fn after_persist(result: Result<Uuid, StoreError>) -> Result<MessageState, IngestError> {
    match result {
        Ok(proposal_id) => Ok(MessageState::Done(MessageOutcome::Complete { proposal_id })),
        Err(StoreError::Duplicate { .. }) => Ok(MessageState::Done(MessageOutcome::Skipped(
            SkipReason::AlreadyIngested { proposal_id: None },
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Counts per terminal state for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestionReport {
    pub fetched: usize,
    pub complete: usize,
    pub skipped: usize,
    pub dropped: usize,
    pub failed: usize,
    pub outcomes: Vec<(String, MessageOutcome)>,
}

impl IngestionReport {
    fn record(&mut self, message_id: &str, outcome: MessageOutcome) {
        match &outcome {
            MessageOutcome::Complete { .. } => self.complete += 1,
            MessageOutcome::Skipped(_) => self.skipped += 1,
            MessageOutcome::Dropped(_) => self.dropped += 1,
            MessageOutcome::Failed(_) => self.failed += 1,
        }
        self.outcomes.push((message_id.to_string(), outcome));
    }
}

#[derive(Clone)]
pub struct IngestionOrchestrator {
    mailbox: Arc<dyn Mailbox>,
    ledger: Arc<dyn DedupLedger>,
    store: Arc<dyn ProcurementStore>,
    matcher: Matcher,
    extraction: ExtractionClient,
    subject_filter: SubjectFilter,
}

impl IngestionOrchestrator {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        ledger: Arc<dyn DedupLedger>,
        store: Arc<dyn ProcurementStore>,
        extraction: ExtractionClient,
    ) -> Self {
        Self {
            mailbox,
            ledger,
            matcher: Matcher::new(store.clone()),
            store,
            extraction,
            subject_filter: SubjectFilter::default(),
        }
    }

    pub fn with_subject_filter(mut self, filter: SubjectFilter) -> Self {
        self.subject_filter = filter;
        self
    }

    /// Poll the mailbox once and process everything it returns.
    ///
    /// Only a mailbox failure fails the run; per-message failures are recorded
    /// in the report.
    pub async fn run(&self, criterion: SearchCriterion) -> Result<IngestionReport, MailboxError> {
        let envelopes = self.mailbox.poll(criterion).await?;
        let report = self.process_all(envelopes).await;
        info!(
            fetched = report.fetched,
            complete = report.complete,
            skipped = report.skipped,
            dropped = report.dropped,
            failed = report.failed,
            "Ingestion run finished"
        );
        Ok(report)
    }

    /// Process envelopes sequentially, in arrival order.
    pub async fn process_all(&self, envelopes: Vec<MessageEnvelope>) -> IngestionReport {
        let mut report = IngestionReport {
            fetched: envelopes.len(),
            ..Default::default()
        };
        for envelope in &envelopes {
            let outcome = self.process_envelope(envelope).await;
            report.record(&envelope.message_id, outcome);
        }
        report
    }

    pub async fn process_envelope(&self, envelope: &MessageEnvelope) -> MessageOutcome {
        let outcome = match self.drive(envelope).await {
            Ok(outcome) => outcome,
            Err(e) => MessageOutcome::Failed(e.to_string()),
        };

        // Sequence ids are positional, so they never enter the ledger.
        if outcome.settles_message() && envelope.has_stable_id() {
            self.ledger.mark_processed(&envelope.message_id).await;
        }
        log_outcome(envelope, &outcome);
        outcome
    }

    async fn drive(&self, envelope: &MessageEnvelope) -> Result<MessageOutcome, IngestError> {
        let mut state = MessageState::Fetched;
        loop {
            state = match state {
                MessageState::Fetched => after_fetch(self.subject_filter, &envelope.subject),
                MessageState::DedupCheck => {
                    after_dedup(
                        !envelope.has_stable_id() || self.ledger.should_process(&envelope.message_id).await,
                    )
                }
                MessageState::Match => after_match(self.matcher.resolve(envelope).await?),
                MessageState::Extract { request, vendor } => {
                    debug!(
                        message_id = %envelope.message_id,
                        request_id = %request.id,
                        vendor = %vendor.name,
                        "Extracting proposal"
                    );
                    let proposal = self
                        .extraction
                        .extract_proposal(&envelope.body, &request.requirements_context())
                        .await?;
                    MessageState::Persist {
                        request_id: request.id,
                        vendor_id: vendor.id,
                        proposal,
                    }
                }
                MessageState::Persist {
                    request_id,
                    vendor_id,
                    proposal,
                } => {
                    let new = NewProposal::from_extraction(request_id, vendor_id, envelope, proposal);
                    after_persist(self.store.create_proposal(new).await)?
                }
                MessageState::Done(outcome) => return Ok(outcome),
            };
        }
    }
}

fn log_outcome(envelope: &MessageEnvelope, outcome: &MessageOutcome) {
    let (message_id, sender, subject) = (&envelope.message_id, &envelope.from, &envelope.subject);
    match outcome {
        MessageOutcome::Complete { proposal_id } => {
            info!(%message_id, %sender, %subject, %proposal_id, "Proposal created from email")
        }
        MessageOutcome::Skipped(reason @ SkipReason::AlreadyIngested { .. }) => {
            info!(%message_id, %sender, %subject, %reason, "Skipping email")
        }
        MessageOutcome::Skipped(reason) => {
            debug!(%message_id, %sender, %subject, %reason, "Skipping email")
        }
        MessageOutcome::Dropped(reason) => {
            warn!(%message_id, %sender, %subject, %reason, "Dropping email")
        }
        MessageOutcome::Failed(reason) => {
            error!(%message_id, %sender, %subject, %reason, "Failed to process email")
        }
    }
}
