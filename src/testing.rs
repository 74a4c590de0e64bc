// In-memory doubles for the pipeline's seams.
//
// Used by unit tests and by the integration tests under tests/, so the module
// is compiled unconditionally.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::request::Requirements;
use crate::entities::{proposal, proposal_item, request, vendor};
use crate::error::{MailboxError, ProviderError, StoreError};
use crate::graphql::types::RequestStatus;
use crate::services::mailbox::{Mailbox, MessageEnvelope, SearchCriterion};
use crate::services::providers::TextGenerator;
use crate::services::store::{NewProposal, ProcurementStore, ProposalRecord};

// =============================================================================
// Mock text generator
// =============================================================================

enum MockReply {
    Text(String),
    RateLimited(Option<Duration>),
    Transport(String),
}

/// Replays queued replies in order, then answers `{}` forever.
#[derive(Default)]
pub struct MockGenerator {
    replies: Mutex<VecDeque<MockReply>>,
    always_rate_limited: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, text: &str) -> Self {
        self.push(MockReply::Text(text.to_string()));
        self
    }

    pub fn with_rate_limit(self, retry_after: Option<Duration>) -> Self {
        self.push(MockReply::RateLimited(retry_after));
        self
    }

    pub fn with_transport_error(self, message: &str) -> Self {
        self.push(MockReply::Transport(message.to_string()));
        self
    }

    pub fn always_rate_limited(self) -> Self {
        self.always_rate_limited.store(true, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// User prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, prompt: &str, _system_prompt: &str) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(prompt.to_string());

        if self.always_rate_limited.load(Ordering::SeqCst) {
            return Err(ProviderError::RateLimited { retry_after: None });
        }

        match self.replies.lock().unwrap().pop_front() {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::RateLimited(retry_after)) => Err(ProviderError::RateLimited { retry_after }),
            Some(MockReply::Transport(message)) => Err(ProviderError::Transport(message)),
            None => Ok("{}".to_string()),
        }
    }
}

// =============================================================================
// Static mailbox
// =============================================================================

/// Returns the same envelopes on every poll.
#[derive(Default)]
pub struct StaticMailbox {
    envelopes: Vec<MessageEnvelope>,
    fail: bool,
    criteria: Mutex<Vec<SearchCriterion>>,
}

impl StaticMailbox {
    pub fn new(envelopes: Vec<MessageEnvelope>) -> Self {
        Self {
            envelopes,
            ..Default::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn polls(&self) -> Vec<SearchCriterion> {
        self.criteria.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailbox for StaticMailbox {
    async fn poll(&self, criterion: SearchCriterion) -> Result<Vec<MessageEnvelope>, MailboxError> {
        self.criteria.lock().unwrap().push(criterion);
        if self.fail {
            return Err(MailboxError::Connect("connection refused".to_string()));
        }
        Ok(self.envelopes.clone())
    }
}

pub fn envelope(message_id: &str, from: &str, subject: &str, body: &str) -> MessageEnvelope {
    MessageEnvelope {
        message_id: message_id.to_string(),
        from: from.to_lowercase(),
        subject: subject.to_string(),
        body: body.to_string(),
    }
}

pub fn envelope_from(from: &str) -> MessageEnvelope {
    envelope(
        &format!("<{}@test>", Uuid::new_v4()),
        from,
        "Re: RFP",
        "We can deliver in 10 days for $1000.",
    )
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
struct StoreState {
    vendors: Vec<vendor::Model>,
    requests: Vec<request::Model>,
    links: Vec<(Uuid, Uuid)>,
    /// Insertion order doubles as receive order.
    proposals: Vec<proposal::Model>,
    items: Vec<proposal_item::Model>,
}

/// `ProcurementStore` over plain vectors, with the same uniqueness rule as the schema.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
    hide_existing: Arc<AtomicBool>,
    score_writes: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the existence check miss, as if a concurrent run had not committed yet.
    /// The insert still enforces uniqueness.
    pub fn simulate_race(&self) {
        self.hide_existing.store(true, Ordering::SeqCst);
    }

    pub fn add_vendor(&self, name: &str, email: &str) -> vendor::Model {
        let now = Utc::now();
        let vendor = vendor::Model {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.trim().to_lowercase(),
            contact_person: None,
            phone: None,
            category: None,
            is_active: true,
            notes: None,
            created_at: now.into(),
            updated_at: now.into(),
        };
        self.state.lock().unwrap().vendors.push(vendor.clone());
        vendor
    }

    pub fn add_request(&self, title: &str, sent_at: Option<DateTime<Utc>>) -> request::Model {
        let now = Utc::now();
        let request = request::Model {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: Some(format!("{} for the office", title)),
            budget: None,
            deadline_days: None,
            payment_terms: None,
            warranty: None,
            requirements: Requirements::default(),
            status: if sent_at.is_some() {
                RequestStatus::Sent
            } else {
                RequestStatus::Draft
            },
            sent_at: sent_at.map(Into::into),
            created_at: now.into(),
            updated_at: now.into(),
        };
        self.state.lock().unwrap().requests.push(request.clone());
        request
    }

    pub fn associate(&self, request_id: Uuid, vendor_id: Uuid) {
        self.state.lock().unwrap().links.push((request_id, vendor_id));
    }

    pub fn proposal_count(&self) -> usize {
        self.state.lock().unwrap().proposals.len()
    }

    pub fn proposals(&self) -> Vec<proposal::Model> {
        self.state.lock().unwrap().proposals.clone()
    }

    pub fn items_for(&self, proposal_id: Uuid) -> Vec<proposal_item::Model> {
        self.state
            .lock()
            .unwrap()
            .items
            .iter()
            .filter(|item| item.proposal_id == proposal_id)
            .cloned()
            .collect()
    }

    pub fn score_writes(&self) -> usize {
        self.score_writes.load(Ordering::SeqCst)
    }

    fn record(state: &StoreState, proposal: &proposal::Model) -> ProposalRecord {
        let (vendor_name, vendor_email) = state
            .vendors
            .iter()
            .find(|v| v.id == proposal.vendor_id)
            .map(|v| (v.name.clone(), v.email.clone()))
            .unwrap_or_default();
        ProposalRecord {
            proposal: proposal.clone(),
            vendor_name,
            vendor_email,
            items: state
                .items
                .iter()
                .filter(|item| item.proposal_id == proposal.id)
                .cloned()
                .collect(),
        }
    }
}

#[async_trait]
impl ProcurementStore for InMemoryStore {
    async fn find_vendor_by_email(&self, email: &str) -> Result<Option<vendor::Model>, StoreError> {
        let email = email.trim().to_lowercase();
        let state = self.state.lock().unwrap();
        Ok(state.vendors.iter().find(|v| v.email == email).cloned())
    }

    async fn latest_sent_request_for_vendor(
        &self,
        vendor_id: Uuid,
    ) -> Result<Option<request::Model>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .requests
            .iter()
            .filter(|r| state.links.contains(&(r.id, vendor_id)))
            .filter(|r| r.sent_at.is_some())
            .max_by_key(|r| r.sent_at)
            .cloned())
    }

    async fn find_proposal_id(
        &self,
        request_id: Uuid,
        vendor_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError> {
        if self.hide_existing.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .proposals
            .iter()
            .find(|p| p.request_id == request_id && p.vendor_id == vendor_id)
            .map(|p| p.id))
    }

    async fn create_proposal(&self, new: NewProposal) -> Result<Uuid, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state
            .proposals
            .iter()
            .any(|p| p.request_id == new.request_id && p.vendor_id == new.vendor_id)
        {
            return Err(StoreError::Duplicate {
                request_id: new.request_id,
                vendor_id: new.vendor_id,
            });
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        state.proposals.push(proposal::Model {
            id,
            request_id: new.request_id,
            vendor_id: new.vendor_id,
            total_price: new.total_price,
            delivery_days: new.delivery_days,
            payment_terms: new.payment_terms,
            warranty: new.warranty,
            raw_email_body: new.raw_email_body,
            ai_summary: new.ai_summary,
            ai_score: None,
            source_message_id: new.source_message_id,
            received_at: now.into(),
            created_at: now.into(),
            updated_at: now.into(),
        });
        for item in new.items {
            state.items.push(proposal_item::Model {
                id: Uuid::new_v4(),
                proposal_id: id,
                item_name: item.item_name,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.total_price,
                specifications: item.specifications,
            });
        }
        Ok(id)
    }

    async fn find_request(&self, request_id: Uuid) -> Result<Option<request::Model>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.requests.iter().find(|r| r.id == request_id).cloned())
    }

    async fn proposals_for_request(&self, request_id: Uuid) -> Result<Vec<ProposalRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .proposals
            .iter()
            .rev()
            .filter(|p| p.request_id == request_id)
            .map(|p| Self::record(&state, p))
            .collect())
    }

    async fn find_proposal(&self, proposal_id: Uuid) -> Result<Option<ProposalRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .proposals
            .iter()
            .find(|p| p.id == proposal_id)
            .map(|p| Self::record(&state, p)))
    }

    async fn record_score(&self, proposal_id: Uuid, score: f64) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(p) = state.proposals.iter_mut().find(|p| p.id == proposal_id) {
            p.ai_score = Some(score);
            self.score_writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
