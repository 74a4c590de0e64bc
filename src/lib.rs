pub mod config;
pub mod entities;
pub mod error;
pub mod graphql;
pub mod services;
pub mod testing;

pub use config::AppConfig;
pub use error::{ExtractionError, IngestError, MailboxError, ProviderError, ServiceError, StoreError};
