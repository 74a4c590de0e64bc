use std::sync::Arc;

use uuid::Uuid;

use crate::entities::{request, vendor};
use crate::error::StoreError;
use crate::services::mailbox::MessageEnvelope;
use crate::services::store::ProcurementStore;

/// Where a message belongs, or why it belongs nowhere.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched {
        request: request::Model,
        vendor: vendor::Model,
    },
    UnknownVendor,
    NoOpenRequest { vendor: vendor::Model },
    AlreadyIngested {
        request_id: Uuid,
        vendor_id: Uuid,
        proposal_id: Uuid,
    },
}

/// Gate applied to the subject before matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubjectFilter {
    /// Recurring ingestion: every message is a candidate.
    #[default]
    AcceptAll,
    /// Diagnostic scan: subject must mention "RFP" or carry a reply marker.
    RfpReplies,
}

impl SubjectFilter {
    pub fn accepts(&self, subject: &str) -> bool {
        match self {
            SubjectFilter::AcceptAll => true,
            SubjectFilter::RfpReplies => {
                subject.contains("RFP") || subject.to_lowercase().contains("re:")
            }
        }
    }
}

/// Resolves an envelope to its (request, vendor) pair.
///
/// The most recently sent request associated with the sender wins; there is no
/// subject or thread correlation.
#[derive(Clone)]
pub struct Matcher {
    store: Arc<dyn ProcurementStore>,
}

impl Matcher {
    pub fn new(store: Arc<dyn ProcurementStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, envelope: &MessageEnvelope) -> Result<MatchOutcome, StoreError> {
        let Some(vendor) = self.store.find_vendor_by_email(&envelope.from).await? else {
            return Ok(MatchOutcome::UnknownVendor);
        };

        let Some(request) = self.store.latest_sent_request_for_vendor(vendor.id).await? else {
            return Ok(MatchOutcome::NoOpenRequest { vendor });
        };

        if let Some(proposal_id) = self.store.find_proposal_id(request.id, vendor.id).await? {
            return Ok(MatchOutcome::AlreadyIngested {
                request_id: request.id,
                vendor_id: vendor.id,
                proposal_id,
            });
        }

        Ok(MatchOutcome::Matched { request, vendor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::testing::{envelope_from, InMemoryStore};

    #[test]
    fn rfp_reply_filter() {
        let filter = SubjectFilter::RfpReplies;
        assert!(filter.accepts("RFP: Office chairs"));
        assert!(filter.accepts("RE: your request"));
        assert!(!filter.accepts("Newsletter"));
        assert!(!filter.accepts("rfp lowercase only"));
        assert!(SubjectFilter::AcceptAll.accepts("Newsletter"));
    }

    #[tokio::test]
    async fn unknown_sender_is_not_matched() {
        let store = Arc::new(InMemoryStore::new());
        let matcher = Matcher::new(store.clone());

        let outcome = matcher.resolve(&envelope_from("stranger@example.com")).await.unwrap();
        assert_eq!(outcome, MatchOutcome::UnknownVendor);
    }

    #[tokio::test]
    async fn vendor_without_sent_request_has_no_open_request() {
        let store = Arc::new(InMemoryStore::new());
        let vendor = store.add_vendor("Acme", "sales@acme.example");
        let draft = store.add_request("Draft only", None);
        store.associate(draft.id, vendor.id);

        let outcome = Matcher::new(store.clone())
            .resolve(&envelope_from("sales@acme.example"))
            .await
            .unwrap();
        assert!(matches!(outcome, MatchOutcome::NoOpenRequest { .. }));
    }

    #[tokio::test]
    async fn most_recently_sent_request_wins() {
        let store = Arc::new(InMemoryStore::new());
        let vendor = store.add_vendor("Acme", "sales@acme.example");
        let now = Utc::now();
        let older = store.add_request("Laptops", Some(now - Duration::days(4)));
        let newer = store.add_request("Monitors", Some(now));
        store.associate(newer.id, vendor.id);
        store.associate(older.id, vendor.id);

        let outcome = Matcher::new(store.clone())
            .resolve(&envelope_from("sales@acme.example"))
            .await
            .unwrap();

        match outcome {
            MatchOutcome::Matched { request, vendor: v } => {
                assert_eq!(request.id, newer.id);
                assert_eq!(v.id, vendor.id);
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }
}
