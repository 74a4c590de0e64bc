use async_graphql::*;
use uuid::Uuid;

use crate::graphql::types::{Comparison, Proposal, Request, Vendor};
use crate::services::store::ProcurementStore;
use crate::services::{ComparisonService, RequestService, SeaOrmStore, VendorService};

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn health(&self) -> &str {
        "OK"
    }

    async fn vendors(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = false)] active_only: bool,
    ) -> Result<Vec<Vendor>> {
        let vendor_service = ctx.data::<VendorService>()?;

        let vendors = vendor_service
            .list_vendors(active_only)
            .await
            .map_err(|e| Error::new(format!("Failed to fetch vendors: {}", e)))?;

        Ok(vendors.into_iter().map(|v| v.into()).collect())
    }

    async fn vendor(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<Vendor>> {
        let vendor_service = ctx.data::<VendorService>()?;

        let vendor = vendor_service
            .get_vendor(id)
            .await
            .map_err(|e| Error::new(format!("Failed to fetch vendor: {}", e)))?;

        Ok(vendor.map(|v| v.into()))
    }

    async fn requests(&self, ctx: &Context<'_>) -> Result<Vec<Request>> {
        let request_service = ctx.data::<RequestService>()?;

        let requests = request_service
            .list_requests()
            .await
            .map_err(|e| Error::new(format!("Failed to fetch requests: {}", e)))?;

        Ok(requests.into_iter().map(|summary| summary.request.into()).collect())
    }

    async fn request(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<Request>> {
        let request_service = ctx.data::<RequestService>()?;

        let request = request_service
            .get_request(id)
            .await
            .map_err(|e| Error::new(format!("Failed to fetch request: {}", e)))?;

        Ok(request.map(|r| r.into()))
    }

    async fn proposals(&self, ctx: &Context<'_>, request_id: Uuid) -> Result<Vec<Proposal>> {
        let store = ctx.data::<SeaOrmStore>()?;

        let proposals = store
            .proposals_for_request(request_id)
            .await
            .map_err(|e| Error::new(format!("Failed to fetch proposals: {}", e)))?;

        Ok(proposals.into_iter().map(|p| p.into()).collect())
    }

    async fn proposal(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<Proposal>> {
        let store = ctx.data::<SeaOrmStore>()?;

        let proposal = store
            .find_proposal(id)
            .await
            .map_err(|e| Error::new(format!("Failed to fetch proposal: {}", e)))?;

        Ok(proposal.map(|p| p.into()))
    }

    /// Scores every proposal for the request and asks for a recommendation.
    /// Scoring problems show up as neutral scores, never as an error.
    async fn compare_proposals(&self, ctx: &Context<'_>, request_id: Uuid) -> Result<Comparison> {
        let comparison_service = ctx.data::<ComparisonService>()?;

        let comparison = comparison_service
            .compare(request_id)
            .await
            .map_err(|e| Error::new(format!("Failed to compare proposals: {}", e)))?;

        Ok(comparison.into())
    }
}
