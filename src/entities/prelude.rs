pub use super::proposal::Entity as Proposal;
pub use super::proposal_item::Entity as ProposalItem;
pub use super::request::Entity as Request;
pub use super::request_vendor::Entity as RequestVendor;
pub use super::vendor::Entity as Vendor;
