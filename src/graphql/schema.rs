use async_graphql::{EmptySubscription, Schema};

use crate::graphql::{MutationRoot, QueryRoot};
use crate::services::{ComparisonService, Poller, RequestService, SeaOrmStore, VendorService};

pub type ApiSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Everything resolvers pull out of the context.
#[derive(Clone)]
pub struct ApiServices {
    pub vendor_service: VendorService,
    pub request_service: RequestService,
    pub store: SeaOrmStore,
    pub comparison_service: ComparisonService,
    /// `None` when no mailbox is configured.
    pub poller: Option<Poller>,
}

pub fn create_schema(services: ApiServices) -> ApiSchema {
    let mut builder = Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(services.vendor_service)
        .data(services.request_service)
        .data(services.store)
        .data(services.comparison_service);

    if let Some(poller) = services.poller {
        builder = builder.data(poller);
    }

    builder.finish()
}
