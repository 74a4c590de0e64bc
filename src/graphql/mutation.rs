use async_graphql::*;
use uuid::Uuid;

use crate::graphql::types::{CreateRequestInput, CreateVendorInput, PollSummary, Request, UpdateVendorInput, Vendor};
use crate::services::{NewRequest, NewVendor, Poller, RequestService, VendorChanges, VendorService};

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn create_vendor(&self, ctx: &Context<'_>, input: CreateVendorInput) -> Result<Vendor> {
        let vendor_service = ctx.data::<VendorService>()?;

        let vendor = vendor_service
            .create_vendor(NewVendor {
                name: input.name,
                email: input.email,
                contact_person: input.contact_person,
                phone: input.phone,
                category: input.category,
                notes: input.notes,
            })
            .await
            .map_err(|e| Error::new(format!("Failed to create vendor: {}", e)))?;

        Ok(vendor.into())
    }

    async fn update_vendor(&self, ctx: &Context<'_>, id: Uuid, input: UpdateVendorInput) -> Result<Vendor> {
        let vendor_service = ctx.data::<VendorService>()?;

        let changes = VendorChanges {
            name: input.name,
            contact_person: input.contact_person.map(Some),
            phone: input.phone.map(Some),
            category: input.category.map(Some),
            is_active: input.is_active,
            notes: input.notes.map(Some),
        };

        let vendor = vendor_service
            .update_vendor(id, changes)
            .await
            .map_err(|e| Error::new(format!("Failed to update vendor: {}", e)))?;

        Ok(vendor.into())
    }

    async fn delete_vendor(&self, ctx: &Context<'_>, id: Uuid) -> Result<bool> {
        let vendor_service = ctx.data::<VendorService>()?;

        vendor_service
            .delete_vendor(id)
            .await
            .map_err(|e| Error::new(format!("Failed to delete vendor: {}", e)))
    }

    async fn create_request(&self, ctx: &Context<'_>, input: CreateRequestInput) -> Result<Request> {
        let request_service = ctx.data::<RequestService>()?;

        let request = request_service
            .create_request(NewRequest {
                title: input.title,
                description: input.description,
                budget: input.budget,
                deadline_days: input.deadline_days,
                payment_terms: input.payment_terms,
                warranty: input.warranty,
                requirements: input.requirements.into_iter().map(Into::into).collect(),
            })
            .await
            .map_err(|e| Error::new(format!("Failed to create request: {}", e)))?;

        Ok(request.into())
    }

    async fn set_request_vendors(
        &self,
        ctx: &Context<'_>,
        request_id: Uuid,
        vendor_ids: Vec<Uuid>,
    ) -> Result<Vec<Vendor>> {
        let request_service = ctx.data::<RequestService>()?;

        let vendors = request_service
            .set_request_vendors(request_id, vendor_ids)
            .await
            .map_err(|e| Error::new(format!("Failed to set request vendors: {}", e)))?;

        Ok(vendors.into_iter().map(|v| v.into()).collect())
    }

    /// Records the request as sent. Replies are only matched to sent requests.
    async fn mark_request_sent(
        &self,
        ctx: &Context<'_>,
        request_id: Uuid,
        #[graphql(default)] vendor_ids: Vec<Uuid>,
    ) -> Result<Request> {
        let request_service = ctx.data::<RequestService>()?;

        let request = request_service
            .mark_request_sent(request_id, vendor_ids)
            .await
            .map_err(|e| Error::new(format!("Failed to mark request as sent: {}", e)))?;

        Ok(request.into())
    }

    /// Run one ingestion pass now, unless one is already running.
    async fn poll_inbox(&self, ctx: &Context<'_>) -> Result<PollSummary> {
        let poller = ctx
            .data::<Poller>()
            .map_err(|_| Error::new("Inbox polling is not configured"))?;

        Ok(poller.poll_once().await.into())
    }
}
