//! One-shot inbox scan.
//!
//! Searches everything received in the last `--days` days (seen or not), keeps
//! only subjects that look like RFP replies and runs them through the same
//! ingestion pipeline as the server. Useful after downtime or when replies were
//! opened by hand before the poller saw them.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use migration::{Migrator, MigratorTrait};
use procurely::config::AppConfig;
use procurely::entities::prelude::Proposal;
use procurely::services::{
    provider_from_config, ExtractionClient, ImapMailbox, InMemoryLedger, IngestionOrchestrator,
    MessageOutcome, SearchCriterion, SeaOrmStore, SubjectFilter,
};
use sea_orm::{Database, EntityTrait, PaginatorTrait};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scan_inbox")]
#[command(about = "Scan recent mail for vendor replies and ingest them once")]
struct Cli {
    /// How many days back to search
    #[arg(long, default_value_t = 7)]
    days: i64,

    /// Ingest every message, not only subjects mentioning RFP or replies
    #[arg(long)]
    all_subjects: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "procurely=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let mail = config
        .mail
        .clone()
        .ok_or_else(|| anyhow!("IMAP_HOST must be set to scan the inbox"))?;

    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    Migrator::up(&db, None).await.context("Failed to run migrations")?;

    let since = (Utc::now() - Duration::days(cli.days)).date_naive();
    let filter = if cli.all_subjects {
        SubjectFilter::AcceptAll
    } else {
        SubjectFilter::RfpReplies
    };

    let orchestrator = IngestionOrchestrator::new(
        Arc::new(ImapMailbox::new(mail)),
        Arc::new(InMemoryLedger::new()),
        Arc::new(SeaOrmStore::new(db.clone())),
        ExtractionClient::new(provider_from_config(&config.ai)?, config.ai.retry),
    )
    .with_subject_filter(filter);

    println!("Scanning inbox since {}...", since);
    let report = orchestrator
        .run(SearchCriterion::Since(since))
        .await
        .context("Inbox scan failed")?;

    for (message_id, outcome) in &report.outcomes {
        match outcome {
            MessageOutcome::Complete { proposal_id } => {
                println!("  [created] {} -> proposal {}", message_id, proposal_id)
            }
            MessageOutcome::Skipped(reason) => println!("  [skipped] {}: {}", message_id, reason),
            MessageOutcome::Dropped(reason) => println!("  [dropped] {}: {}", message_id, reason),
            MessageOutcome::Failed(reason) => println!("  [failed]  {}: {}", message_id, reason),
        }
    }

    let total = Proposal::find().count(&db).await?;
    println!(
        "Fetched {}, created {}, skipped {}, dropped {}, failed {}. Total proposals in database: {}",
        report.fetched, report.complete, report.skipped, report.dropped, report.failed, total
    );

    Ok(())
}
