use async_graphql::*;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::StringLen;
use sea_orm::DeriveActiveEnum;
use serde::{Deserialize, Serialize};
use strum::EnumIter;
use uuid::Uuid;

use crate::entities::request::RequirementItem;
use crate::services::ingestion::IngestionReport;
use crate::services::scheduler::PollResult;
use crate::services::scoring;
use crate::services::store::{ProcurementStore, ProposalRecord};
use crate::services::{RequestService, SeaOrmStore};

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug, DeriveActiveEnum, Serialize, Deserialize, EnumIter)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[graphql(name = "RequestStatus")]
pub enum RequestStatus {
    #[graphql(name = "DRAFT")]
    #[sea_orm(string_value = "draft")]
    Draft,
    #[graphql(name = "SENT")]
    #[sea_orm(string_value = "sent")]
    Sent,
}

#[derive(SimpleObject)]
pub struct Vendor {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub category: Option<String>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<crate::entities::vendor::Model> for Vendor {
    fn from(vendor: crate::entities::vendor::Model) -> Self {
        Self {
            id: vendor.id,
            name: vendor.name,
            email: vendor.email,
            contact_person: vendor.contact_person,
            phone: vendor.phone,
            category: vendor.category,
            is_active: vendor.is_active,
            notes: vendor.notes,
            created_at: vendor.created_at.into(),
            updated_at: vendor.updated_at.into(),
        }
    }
}

#[derive(SimpleObject, InputObject, Clone)]
#[graphql(input_name = "RequirementLineInput")]
pub struct RequirementLine {
    pub item_name: String,
    pub quantity: Option<i32>,
    pub specifications: Option<String>,
}

impl From<RequirementItem> for RequirementLine {
    fn from(item: RequirementItem) -> Self {
        Self {
            item_name: item.item_name,
            quantity: item.quantity,
            specifications: item.specifications,
        }
    }
}

impl From<RequirementLine> for RequirementItem {
    fn from(line: RequirementLine) -> Self {
        Self {
            item_name: line.item_name,
            quantity: line.quantity,
            specifications: line.specifications,
        }
    }
}

#[derive(SimpleObject)]
#[graphql(complex)]
pub struct Request {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub budget: Option<f64>,
    pub deadline_days: Option<i32>,
    pub payment_terms: Option<String>,
    pub warranty: Option<String>,
    pub requirements: Vec<RequirementLine>,
    pub status: RequestStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<crate::entities::request::Model> for Request {
    fn from(request: crate::entities::request::Model) -> Self {
        Self {
            id: request.id,
            title: request.title,
            description: request.description,
            budget: request.budget,
            deadline_days: request.deadline_days,
            payment_terms: request.payment_terms,
            warranty: request.warranty,
            requirements: request.requirements.0.into_iter().map(Into::into).collect(),
            status: request.status,
            sent_at: request.sent_at.map(Into::into),
            created_at: request.created_at.into(),
            updated_at: request.updated_at.into(),
        }
    }
}

#[ComplexObject]
impl Request {
    async fn vendors(&self, ctx: &Context<'_>) -> Result<Vec<Vendor>> {
        let request_service = ctx.data::<RequestService>()?;
        let vendors = request_service
            .vendors_for_request(self.id)
            .await
            .map_err(|e| Error::new(format!("Failed to fetch vendors: {}", e)))?;
        Ok(vendors.into_iter().map(Into::into).collect())
    }

    async fn proposals(&self, ctx: &Context<'_>) -> Result<Vec<Proposal>> {
        let store = ctx.data::<SeaOrmStore>()?;
        let proposals = store
            .proposals_for_request(self.id)
            .await
            .map_err(|e| Error::new(format!("Failed to fetch proposals: {}", e)))?;
        Ok(proposals.into_iter().map(Into::into).collect())
    }

    async fn proposal_count(&self, ctx: &Context<'_>) -> Result<u64> {
        let request_service = ctx.data::<RequestService>()?;
        request_service
            .proposal_count(self.id)
            .await
            .map_err(|e| Error::new(format!("Failed to count proposals: {}", e)))
    }
}

#[derive(SimpleObject)]
pub struct ProposalItem {
    pub id: Uuid,
    pub item_name: String,
    pub quantity: Option<i32>,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
    pub specifications: Option<String>,
}

impl From<crate::entities::proposal_item::Model> for ProposalItem {
    fn from(item: crate::entities::proposal_item::Model) -> Self {
        Self {
            id: item.id,
            item_name: item.item_name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
            specifications: item.specifications,
        }
    }
}

#[derive(SimpleObject)]
pub struct Proposal {
    pub id: Uuid,
    pub request_id: Uuid,
    pub vendor_id: Uuid,
    pub vendor_name: String,
    pub vendor_email: String,
    pub total_price: Option<f64>,
    pub delivery_days: Option<i32>,
    pub payment_terms: Option<String>,
    pub warranty: Option<String>,
    pub raw_email_body: String,
    pub ai_summary: Option<String>,
    pub ai_score: Option<f64>,
    pub items: Vec<ProposalItem>,
    pub received_at: DateTime<Utc>,
}

impl From<ProposalRecord> for Proposal {
    fn from(record: ProposalRecord) -> Self {
        let p = record.proposal;
        Self {
            id: p.id,
            request_id: p.request_id,
            vendor_id: p.vendor_id,
            vendor_name: record.vendor_name,
            vendor_email: record.vendor_email,
            total_price: p.total_price,
            delivery_days: p.delivery_days,
            payment_terms: p.payment_terms,
            warranty: p.warranty,
            raw_email_body: p.raw_email_body,
            ai_summary: p.ai_summary,
            ai_score: p.ai_score,
            items: record.items.into_iter().map(Into::into).collect(),
            received_at: p.received_at.into(),
        }
    }
}

#[derive(SimpleObject)]
pub struct RankedProposal {
    pub proposal: Proposal,
    pub score: f64,
    pub reasoning: String,
    /// False when the neutral score was substituted.
    pub evaluated: bool,
}

impl From<scoring::ScoredProposal> for RankedProposal {
    fn from(scored: scoring::ScoredProposal) -> Self {
        Self {
            proposal: scored.record.into(),
            score: scored.score,
            reasoning: scored.reasoning,
            evaluated: scored.evaluated,
        }
    }
}

#[derive(SimpleObject)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

#[derive(SimpleObject)]
pub struct Comparison {
    pub request_id: Uuid,
    pub total_proposals: i32,
    pub price_range: PriceRange,
    pub avg_score: f64,
    pub ranked_proposals: Vec<RankedProposal>,
    pub recommendation_text: String,
    pub recommended_proposal: Option<RankedProposal>,
}

impl From<scoring::Comparison> for Comparison {
    fn from(comparison: scoring::Comparison) -> Self {
        Self {
            request_id: comparison.request_id,
            total_proposals: comparison.total_proposals as i32,
            price_range: PriceRange {
                min: comparison.price_range.min,
                max: comparison.price_range.max,
            },
            avg_score: comparison.avg_score,
            ranked_proposals: comparison.ranked_proposals.into_iter().map(Into::into).collect(),
            recommendation_text: comparison.recommendation_text,
            recommended_proposal: comparison.recommended_proposal.map(Into::into),
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
#[graphql(name = "PollStatus")]
pub enum PollStatus {
    #[graphql(name = "FINISHED")]
    Finished,
    #[graphql(name = "SKIPPED_ACTIVE")]
    SkippedActive,
    #[graphql(name = "FAILED")]
    Failed,
}

#[derive(SimpleObject, Default)]
pub struct IngestionCounts {
    pub fetched: i32,
    pub complete: i32,
    pub skipped: i32,
    pub dropped: i32,
    pub failed: i32,
}

impl From<&IngestionReport> for IngestionCounts {
    fn from(report: &IngestionReport) -> Self {
        Self {
            fetched: report.fetched as i32,
            complete: report.complete as i32,
            skipped: report.skipped as i32,
            dropped: report.dropped as i32,
            failed: report.failed as i32,
        }
    }
}

#[derive(SimpleObject)]
pub struct PollSummary {
    pub status: PollStatus,
    pub counts: IngestionCounts,
    pub error: Option<String>,
}

impl From<PollResult> for PollSummary {
    fn from(result: PollResult) -> Self {
        match result {
            PollResult::Finished(report) => Self {
                status: PollStatus::Finished,
                counts: (&report).into(),
                error: None,
            },
            PollResult::SkippedActive => Self {
                status: PollStatus::SkippedActive,
                counts: IngestionCounts::default(),
                error: None,
            },
            PollResult::Failed(e) => Self {
                status: PollStatus::Failed,
                counts: IngestionCounts::default(),
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(InputObject)]
pub struct CreateVendorInput {
    pub name: String,
    pub email: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub category: Option<String>,
    pub notes: Option<String>,
}

/// Omitted fields are left unchanged.
#[derive(InputObject)]
pub struct UpdateVendorInput {
    pub name: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
    pub notes: Option<String>,
}

#[derive(InputObject)]
pub struct CreateRequestInput {
    pub title: String,
    pub description: Option<String>,
    pub budget: Option<f64>,
    pub deadline_days: Option<i32>,
    pub payment_terms: Option<String>,
    pub warranty: Option<String>,
    #[graphql(default)]
    pub requirements: Vec<RequirementLine>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::ActiveEnum;

    #[test]
    fn request_status_is_stored_as_lowercase_text() {
        assert_eq!(ActiveEnum::to_value(&RequestStatus::Draft), "draft");
        assert_eq!(ActiveEnum::to_value(&RequestStatus::Sent), "sent");
        assert_eq!(
            RequestStatus::try_from_value(&"sent".to_string()).unwrap(),
            RequestStatus::Sent
        );
        assert!(RequestStatus::try_from_value(&"archived".to_string()).is_err());
    }
}
