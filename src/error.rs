//! Error taxonomy shared by the ingestion and scoring pipeline.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Failure reported by a text-generation provider for a single call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider asked us to slow down (HTTP 429).
    #[error("rate limited by provider (retry hint: {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Connection, timeout or body-read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success response other than a rate limit.
    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The response body did not have the provider's documented shape.
    #[error("unexpected provider response: {0}")]
    Response(String),
}

impl ProviderError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Provider failure that survived the whole retry budget.
    #[error("extraction service unavailable after {attempts} attempt(s): {source}")]
    Provider {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// The model answered, but not with the JSON we asked for. Never retried.
    #[error("extraction service returned malformed output: {reason}")]
    Format { reason: String, raw: String },
}

impl ExtractionError {
    pub fn is_format(&self) -> bool {
        matches!(self, ExtractionError::Format { .. })
    }
}

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("failed to connect to mailbox: {0}")]
    Connect(String),

    #[error("mailbox protocol error during {stage}: {message}")]
    Protocol { stage: &'static str, message: String },

    #[error("mailbox run exceeded {}s and was abandoned", .0.as_secs())]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage-level uniqueness violation on (request_id, vendor_id).
    #[error("proposal already exists for request {request_id} and vendor {vendor_id}")]
    Duplicate { request_id: Uuid, vendor_id: Uuid },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Failure of one message inside an ingestion run. Never aborts the run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by the administrative and query services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Store(#[from] StoreError),
}
