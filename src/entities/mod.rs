pub mod prelude;

pub mod proposal;
pub mod proposal_item;
pub mod request;
pub mod request_vendor;
pub mod vendor;
