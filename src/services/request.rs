use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

use crate::entities::request::{RequirementItem, Requirements};
use crate::entities::{prelude::*, proposal, request, request_vendor, vendor};
use crate::error::ServiceError;
use crate::graphql::types::RequestStatus;

#[derive(Debug, Clone, Default)]
pub struct NewRequest {
    pub title: String,
    pub description: Option<String>,
    pub budget: Option<f64>,
    pub deadline_days: Option<i32>,
    pub payment_terms: Option<String>,
    pub warranty: Option<String>,
    pub requirements: Vec<RequirementItem>,
}

#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub request: request::Model,
    pub proposal_count: i64,
}

#[derive(Clone)]
pub struct RequestService {
    db: DatabaseConnection,
}

impl RequestService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new request in DRAFT status
    pub async fn create_request(&self, input: NewRequest) -> Result<request::Model, ServiceError> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(ServiceError::Validation("Request title is required".to_string()));
        }
        if let Some(budget) = input.budget {
            if !budget.is_finite() || budget < 0.0 {
                return Err(ServiceError::Validation("Budget must be a non-negative number".to_string()));
            }
        }

        let now = Utc::now();
        let new_request = request::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title),
            description: Set(input.description),
            budget: Set(input.budget),
            deadline_days: Set(input.deadline_days),
            payment_terms: Set(input.payment_terms),
            warranty: Set(input.warranty),
            requirements: Set(Requirements(input.requirements)),
            status: Set(RequestStatus::Draft),
            sent_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        Ok(new_request.insert(&self.db).await?)
    }

    /// All requests, newest first, with their proposal counts.
    pub async fn list_requests(&self) -> Result<Vec<RequestSummary>, ServiceError> {
        let requests = Request::find()
            .order_by_desc(request::Column::CreatedAt)
            .all(&self.db)
            .await?;

        let counts: HashMap<Uuid, i64> = Proposal::find()
            .select_only()
            .column(proposal::Column::RequestId)
            .column_as(proposal::Column::Id.count(), "proposal_count")
            .group_by(proposal::Column::RequestId)
            .into_tuple::<(Uuid, i64)>()
            .all(&self.db)
            .await?
            .into_iter()
            .collect();

        Ok(requests
            .into_iter()
            .map(|request| RequestSummary {
                proposal_count: counts.get(&request.id).copied().unwrap_or(0),
                request,
            })
            .collect())
    }

    pub async fn get_request(&self, request_id: Uuid) -> Result<Option<request::Model>, ServiceError> {
        Ok(Request::find_by_id(request_id).one(&self.db).await?)
    }

    pub async fn proposal_count(&self, request_id: Uuid) -> Result<u64, ServiceError> {
        Ok(Proposal::find()
            .filter(proposal::Column::RequestId.eq(request_id))
            .count(&self.db)
            .await?)
    }

    pub async fn vendors_for_request(&self, request_id: Uuid) -> Result<Vec<vendor::Model>, ServiceError> {
        let request = self.require(request_id).await?;
        Ok(request
            .find_related(Vendor)
            .order_by_asc(vendor::Column::Name)
            .all(&self.db)
            .await?)
    }

    /// Replace the vendor set of a DRAFT request.
    pub async fn set_request_vendors(
        &self,
        request_id: Uuid,
        vendor_ids: Vec<Uuid>,
    ) -> Result<Vec<vendor::Model>, ServiceError> {
        let request = self.require(request_id).await?;
        if request.status != RequestStatus::Draft {
            return Err(ServiceError::Conflict(
                "Vendors can only be changed while the request is a draft".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        RequestVendor::delete_many()
            .filter(request_vendor::Column::RequestId.eq(request_id))
            .exec(&txn)
            .await?;
        link_vendors(&txn, request_id, &vendor_ids, &HashSet::new()).await?;
        txn.commit().await?;

        self.vendors_for_request(request_id).await
    }

    /// Mark a request as sent, optionally associating more vendors first.
    ///
    /// `sent_at` is what the inbound matcher orders on, so sending again moves
    /// the request to the front for its vendors.
    pub async fn mark_request_sent(
        &self,
        request_id: Uuid,
        vendor_ids: Vec<Uuid>,
    ) -> Result<request::Model, ServiceError> {
        let request = self.require(request_id).await?;

        let txn = self.db.begin().await?;
        let linked: HashSet<Uuid> = RequestVendor::find()
            .filter(request_vendor::Column::RequestId.eq(request_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|link| link.vendor_id)
            .collect();

        let added = link_vendors(&txn, request_id, &vendor_ids, &linked).await?;
        if linked.is_empty() && added == 0 {
            return Err(ServiceError::Validation(
                "A request must have at least one vendor before it is sent".to_string(),
            ));
        }

        let now = Utc::now();
        let mut request_active: request::ActiveModel = request.into();
        request_active.status = Set(RequestStatus::Sent);
        request_active.sent_at = Set(Some(now.into()));
        request_active.updated_at = Set(now.into());
        let updated = request_active.update(&txn).await?;

        txn.commit().await?;
        info!(%request_id, vendors = linked.len() + added, "Request marked as sent");
        Ok(updated)
    }

    async fn require(&self, request_id: Uuid) -> Result<request::Model, ServiceError> {
        self.get_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Request {}", request_id)))
    }
}

/// Insert links for vendors not already in `existing`. Returns how many were added.
async fn link_vendors(
    txn: &DatabaseTransaction,
    request_id: Uuid,
    vendor_ids: &[Uuid],
    existing: &HashSet<Uuid>,
) -> Result<usize, ServiceError> {
    let wanted: Vec<Uuid> = vendor_ids
        .iter()
        .copied()
        .filter(|id| !existing.contains(id))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    if wanted.is_empty() {
        return Ok(0);
    }

    let found = Vendor::find()
        .filter(vendor::Column::Id.is_in(wanted.clone()))
        .count(txn)
        .await?;
    if found as usize != wanted.len() {
        return Err(ServiceError::Validation("One or more vendors do not exist".to_string()));
    }

    let links = wanted.iter().map(|vendor_id| request_vendor::ActiveModel {
        request_id: Set(request_id),
        vendor_id: Set(*vendor_id),
    });
    RequestVendor::insert_many(links).exec(txn).await?;
    Ok(wanted.len())
}
