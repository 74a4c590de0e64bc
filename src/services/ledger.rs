use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

/// Record of message identifiers that completed ingestion.
///
/// Only an optimisation to skip repeat extraction calls; the proposal uniqueness
/// constraint in storage is what keeps ingestion idempotent.
#[async_trait]
pub trait DedupLedger: Send + Sync {
    async fn should_process(&self, message_id: &str) -> bool;
    async fn mark_processed(&self, message_id: &str);
}

/// Process-lifetime ledger. Grows without eviction and is lost on restart.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    seen: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DedupLedger for InMemoryLedger {
    async fn should_process(&self, message_id: &str) -> bool {
        match self.seen.lock() {
            Ok(seen) => !seen.contains(message_id),
            // A poisoned ledger only costs a redundant extraction call.
            Err(_) => true,
        }
    }

    async fn mark_processed(&self, message_id: &str) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.insert(message_id.to_string());
        }
    }
}
