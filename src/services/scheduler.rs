use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::PollConfig;
use crate::error::MailboxError;
use crate::services::ingestion::{IngestionOrchestrator, IngestionReport};
use crate::services::mailbox::SearchCriterion;

/// Marks an ingestion run as active. Shared by the timer and manual triggers.
#[derive(Clone, Default)]
pub struct RunGuard {
    active: Arc<AtomicBool>,
}

/// Held for the duration of a run; releases the guard on drop.
pub struct RunPermit {
    active: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                active: self.active.clone(),
            })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// What happened when a run was requested.
#[derive(Debug)]
pub enum PollResult {
    Finished(IngestionReport),
    /// Another run was active and overlap is disabled.
    SkippedActive,
    Failed(MailboxError),
}

/// Entry point for both the recurring timer and the manual trigger.
#[derive(Clone)]
pub struct Poller {
    orchestrator: IngestionOrchestrator,
    guard: RunGuard,
    allow_overlap: bool,
}

impl Poller {
    pub fn new(orchestrator: IngestionOrchestrator, allow_overlap: bool) -> Self {
        Self {
            orchestrator,
            guard: RunGuard::new(),
            allow_overlap,
        }
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    /// Run one unseen-only ingestion pass unless one is already in flight.
    pub async fn poll_once(&self) -> PollResult {
        let _permit = match self.guard.try_acquire() {
            Some(permit) => Some(permit),
            None if self.allow_overlap => None,
            None => {
                warn!("Previous ingestion run still active, skipping this one");
                return PollResult::SkippedActive;
            }
        };

        match self.orchestrator.run(SearchCriterion::Unseen).await {
            Ok(report) => PollResult::Finished(report),
            Err(e) => {
                error!(error = %e, "Ingestion run failed");
                PollResult::Failed(e)
            }
        }
    }
}

/// Start the recurring poll loop: one run immediately, then one per interval.
pub fn spawn_poller(poller: Poller, config: &PollConfig) -> JoinHandle<()> {
    let period = config.interval;
    info!(interval_ms = period.as_millis() as u64, allow_overlap = poller.allow_overlap, "Starting inbox poller");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // The first tick completes immediately.
            interval.tick().await;
            let poller = poller.clone();
            // Each run gets its own task so a slow run never blocks the timer.
            tokio::spawn(async move {
                poller.poll_once().await;
            });
        }
    })
}
