// Persistence gateway for the ingestion and scoring pipeline.
//
// `ProcurementStore` is the only way the pipeline touches storage, so tests can
// drive the orchestrator against `testing::InMemoryStore`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::*;
use tracing::debug;
use uuid::Uuid;

use crate::entities::{prelude::*, proposal, proposal_item, request, request_vendor, vendor};
use crate::error::StoreError;
use crate::services::extraction::StructuredProposal;
use crate::services::mailbox::MessageEnvelope;

#[derive(Debug, Clone, PartialEq)]
pub struct NewProposalItem {
    pub item_name: String,
    pub quantity: Option<i32>,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
    pub specifications: Option<String>,
}

/// Everything needed to write a proposal and its items in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProposal {
    pub request_id: Uuid,
    pub vendor_id: Uuid,
    pub total_price: Option<f64>,
    pub delivery_days: Option<i32>,
    pub payment_terms: Option<String>,
    pub warranty: Option<String>,
    pub raw_email_body: String,
    pub ai_summary: Option<String>,
    pub source_message_id: Option<String>,
    pub items: Vec<NewProposalItem>,
}

impl NewProposal {
    pub fn from_extraction(
        request_id: Uuid,
        vendor_id: Uuid,
        envelope: &MessageEnvelope,
        extracted: StructuredProposal,
    ) -> Self {
        let items = extracted
            .items
            .into_iter()
            .filter_map(|item| {
                // Unnamed lines cannot be shown or compared.
                let item_name = non_blank(item.item_name)?.trim().to_string();
                Some(NewProposalItem {
                    item_name,
                    quantity: item.quantity.map(|q| q.round() as i32),
                    unit_price: item.unit_price,
                    total_price: item.total_price,
                    specifications: non_blank(item.specifications),
                })
            })
            .collect();

        Self {
            request_id,
            vendor_id,
            total_price: extracted.total_price,
            delivery_days: extracted.delivery_days.map(|d| d.round() as i32),
            payment_terms: non_blank(extracted.payment_terms),
            warranty: non_blank(extracted.warranty),
            raw_email_body: envelope.body.clone(),
            ai_summary: non_blank(extracted.summary),
            source_message_id: Some(envelope.message_id.clone()),
            items,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// A stored proposal joined with its vendor and line items.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalRecord {
    pub proposal: proposal::Model,
    pub vendor_name: String,
    pub vendor_email: String,
    pub items: Vec<proposal_item::Model>,
}

#[async_trait]
pub trait ProcurementStore: Send + Sync {
    /// Exact match on the (lowercased) vendor email.
    async fn find_vendor_by_email(&self, email: &str) -> Result<Option<vendor::Model>, StoreError>;

    /// The vendor's associated request with the latest `sent_at`; unsent requests are ignored.
    async fn latest_sent_request_for_vendor(
        &self,
        vendor_id: Uuid,
    ) -> Result<Option<request::Model>, StoreError>;

    async fn find_proposal_id(
        &self,
        request_id: Uuid,
        vendor_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError>;

    /// Insert a proposal and its items atomically. A uniqueness violation on
    /// (request_id, vendor_id) is reported as [`StoreError::Duplicate`].
    async fn create_proposal(&self, proposal: NewProposal) -> Result<Uuid, StoreError>;

    async fn find_request(&self, request_id: Uuid) -> Result<Option<request::Model>, StoreError>;

    /// All proposals for a request, newest first.
    async fn proposals_for_request(&self, request_id: Uuid) -> Result<Vec<ProposalRecord>, StoreError>;

    async fn find_proposal(&self, proposal_id: Uuid) -> Result<Option<ProposalRecord>, StoreError>;

    async fn record_score(&self, proposal_id: Uuid, score: f64) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn attach_items(
        &self,
        rows: Vec<(proposal::Model, Option<vendor::Model>)>,
    ) -> Result<Vec<ProposalRecord>, StoreError> {
        let ids: Vec<Uuid> = rows.iter().map(|(p, _)| p.id).collect();
        let mut items_by_proposal: HashMap<Uuid, Vec<proposal_item::Model>> = HashMap::new();

        if !ids.is_empty() {
            let items = ProposalItem::find()
                .filter(proposal_item::Column::ProposalId.is_in(ids))
                .order_by_asc(proposal_item::Column::ItemName)
                .all(&self.db)
                .await?;
            for item in items {
                items_by_proposal.entry(item.proposal_id).or_default().push(item);
            }
        }

        Ok(rows
            .into_iter()
            .map(|(proposal, vendor)| {
                let items = items_by_proposal.remove(&proposal.id).unwrap_or_default();
                let (vendor_name, vendor_email) = vendor
                    .map(|v| (v.name, v.email))
                    .unwrap_or_default();
                ProposalRecord {
                    proposal,
                    vendor_name,
                    vendor_email,
                    items,
                }
            })
            .collect())
    }
}

#[async_trait]
impl ProcurementStore for SeaOrmStore {
    async fn find_vendor_by_email(&self, email: &str) -> Result<Option<vendor::Model>, StoreError> {
        Ok(Vendor::find()
            .filter(vendor::Column::Email.eq(email.trim().to_lowercase()))
            .one(&self.db)
            .await?)
    }

    async fn latest_sent_request_for_vendor(
        &self,
        vendor_id: Uuid,
    ) -> Result<Option<request::Model>, StoreError> {
        Ok(Request::find()
            .join(JoinType::InnerJoin, request::Relation::RequestVendor.def())
            .filter(request_vendor::Column::VendorId.eq(vendor_id))
            .filter(request::Column::SentAt.is_not_null())
            .order_by_desc(request::Column::SentAt)
            .one(&self.db)
            .await?)
    }

    async fn find_proposal_id(
        &self,
        request_id: Uuid,
        vendor_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError> {
        Ok(Proposal::find()
            .filter(proposal::Column::RequestId.eq(request_id))
            .filter(proposal::Column::VendorId.eq(vendor_id))
            .one(&self.db)
            .await?
            .map(|p| p.id))
    }

    async fn create_proposal(&self, new: NewProposal) -> Result<Uuid, StoreError> {
        let (request_id, vendor_id) = (new.request_id, new.vendor_id);
        let txn = self.db.begin().await?;

        let proposal_id = Uuid::new_v4();
        let now = Utc::now();
        let proposal = proposal::ActiveModel {
            id: Set(proposal_id),
            request_id: Set(request_id),
            vendor_id: Set(vendor_id),
            total_price: Set(new.total_price),
            delivery_days: Set(new.delivery_days),
            payment_terms: Set(new.payment_terms),
            warranty: Set(new.warranty),
            raw_email_body: Set(new.raw_email_body),
            ai_summary: Set(new.ai_summary),
            ai_score: Set(None),
            source_message_id: Set(new.source_message_id),
            received_at: Set(now.into()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        if let Err(err) = proposal.insert(&txn).await {
            let _ = txn.rollback().await;
            return Err(match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::Duplicate { request_id, vendor_id },
                _ => StoreError::Database(err),
            });
        }

        if !new.items.is_empty() {
            let items = new.items.into_iter().map(|item| proposal_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                proposal_id: Set(proposal_id),
                item_name: Set(item.item_name),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                total_price: Set(item.total_price),
                specifications: Set(item.specifications),
            });
            ProposalItem::insert_many(items).exec(&txn).await?;
        }

        txn.commit().await?;
        debug!(%proposal_id, %request_id, %vendor_id, "Proposal persisted");
        Ok(proposal_id)
    }

    async fn find_request(&self, request_id: Uuid) -> Result<Option<request::Model>, StoreError> {
        Ok(Request::find_by_id(request_id).one(&self.db).await?)
    }

    async fn proposals_for_request(&self, request_id: Uuid) -> Result<Vec<ProposalRecord>, StoreError> {
        let rows = Proposal::find()
            .filter(proposal::Column::RequestId.eq(request_id))
            .find_also_related(Vendor)
            .order_by_desc(proposal::Column::ReceivedAt)
            .all(&self.db)
            .await?;
        self.attach_items(rows).await
    }

    async fn find_proposal(&self, proposal_id: Uuid) -> Result<Option<ProposalRecord>, StoreError> {
        let row = Proposal::find_by_id(proposal_id)
            .find_also_related(Vendor)
            .one(&self.db)
            .await?;
        match row {
            Some(row) => Ok(self.attach_items(vec![row]).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn record_score(&self, proposal_id: Uuid, score: f64) -> Result<(), StoreError> {
        let update = proposal::ActiveModel {
            id: Set(proposal_id),
            ai_score: Set(Some(score)),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };
        update.update(&self.db).await?;
        Ok(())
    }
}
