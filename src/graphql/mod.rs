pub mod types;
pub mod mutation;
pub mod query;
pub mod schema;

pub use types::*;
pub use mutation::*;
pub use query::*;
pub use schema::*;
