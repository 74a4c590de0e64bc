pub mod extraction;
pub mod ingestion;
pub mod ledger;
pub mod mailbox;
pub mod matcher;
pub mod providers;
pub mod request;
pub mod scheduler;
pub mod scoring;
pub mod store;
pub mod vendor;

pub use extraction::{ExtractionClient, RetryPolicy};
pub use ingestion::{IngestionOrchestrator, IngestionReport, MessageOutcome};
pub use ledger::{DedupLedger, InMemoryLedger};
pub use mailbox::{ImapMailbox, Mailbox, MessageEnvelope, SearchCriterion};
pub use matcher::{Matcher, SubjectFilter};
pub use providers::{provider_from_config, TextGenerator};
pub use request::*;
pub use scheduler::{spawn_poller, PollResult, Poller, RunGuard};
pub use scoring::ComparisonService;
pub use store::{ProcurementStore, SeaOrmStore};
pub use vendor::*;
