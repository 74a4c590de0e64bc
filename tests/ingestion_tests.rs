//! Ingestion pipeline tests driven through in-memory doubles.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use procurely::services::ingestion::{DropReason, MessageOutcome, SkipReason};
use procurely::services::{
    DedupLedger, ExtractionClient, InMemoryLedger, IngestionOrchestrator, PollResult, Poller, RetryPolicy,
    SearchCriterion,
};
use procurely::testing::{envelope, InMemoryStore, MockGenerator, StaticMailbox};

const LAPTOP_REPLY: &str = r#"```json
{
  "totalPrice": 22000,
  "deliveryDays": 14,
  "paymentTerms": "Net 30",
  "warranty": "1 year",
  "items": [
    {"itemName": "Laptop", "quantity": 20, "unitPrice": 1100, "totalPrice": 22000, "specifications": "16GB RAM"}
  ],
  "summary": "20 laptops, two weeks"
}
```"#;

struct Harness {
    store: Arc<InMemoryStore>,
    ledger: Arc<InMemoryLedger>,
    generator: Arc<MockGenerator>,
    mailbox: Arc<StaticMailbox>,
    orchestrator: IngestionOrchestrator,
}

fn harness(store: Arc<InMemoryStore>, generator: MockGenerator, mailbox: StaticMailbox) -> Harness {
    let generator = Arc::new(generator);
    let mailbox = Arc::new(mailbox);
    let ledger = Arc::new(InMemoryLedger::new());
    let extraction = ExtractionClient::new(
        generator.clone(),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        },
    );
    let orchestrator =
        IngestionOrchestrator::new(mailbox.clone(), ledger.clone(), store.clone(), extraction);

    Harness {
        store,
        ledger,
        generator,
        mailbox,
        orchestrator,
    }
}

#[tokio::test]
async fn unknown_sender_is_dropped_without_extraction() {
    let store = Arc::new(InMemoryStore::new());
    let mail = envelope("<1@x>", "stranger@example.com", "Re: RFP", "Quote attached");
    let h = harness(store, MockGenerator::new(), StaticMailbox::new(vec![mail.clone()]));

    let outcome = h.orchestrator.process_envelope(&mail).await;

    assert_eq!(outcome, MessageOutcome::Dropped(DropReason::UnknownVendor));
    assert_eq!(h.store.proposal_count(), 0);
    assert_eq!(h.generator.call_count(), 0);
    assert!(h.ledger.should_process("<1@x>").await);
}

#[tokio::test]
async fn vendor_without_sent_request_is_dropped() {
    let store = Arc::new(InMemoryStore::new());
    let vendor = store.add_vendor("Acme", "sales@acme.example");
    let draft = store.add_request("Laptops", None);
    store.associate(draft.id, vendor.id);

    let mail = envelope("<1@x>", "sales@acme.example", "Re: RFP", "Quote");
    let h = harness(store, MockGenerator::new(), StaticMailbox::default());

    let outcome = h.orchestrator.process_envelope(&mail).await;
    assert_eq!(outcome, MessageOutcome::Dropped(DropReason::NoOpenRequest));
}

#[tokio::test]
async fn reply_becomes_a_proposal_with_items() {
    let store = Arc::new(InMemoryStore::new());
    let vendor = store.add_vendor("Acme", "sales@acme.example");
    let request = store.add_request("Laptops", Some(Utc::now()));
    store.associate(request.id, vendor.id);

    let mail = envelope("<1@x>", "Sales@Acme.example", "Re: RFP - Laptops", "Full quote body");
    let h = harness(
        store,
        MockGenerator::new().with_response(LAPTOP_REPLY),
        StaticMailbox::default(),
    );

    let outcome = h.orchestrator.process_envelope(&mail).await;

    let MessageOutcome::Complete { proposal_id } = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    let proposals = h.store.proposals();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].id, proposal_id);
    assert_eq!(proposals[0].request_id, request.id);
    assert_eq!(proposals[0].vendor_id, vendor.id);
    assert_eq!(proposals[0].total_price, Some(22000.0));
    assert_eq!(proposals[0].delivery_days, Some(14));
    assert_eq!(proposals[0].raw_email_body, "Full quote body");
    assert_eq!(proposals[0].source_message_id.as_deref(), Some("<1@x>"));

    let items = h.store.items_for(proposal_id);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item_name, "Laptop");
    assert_eq!(items[0].quantity, Some(20));

    assert!(!h.ledger.should_process("<1@x>").await);
}

#[tokio::test]
async fn existing_proposal_is_left_untouched() {
    let store = Arc::new(InMemoryStore::new());
    let vendor = store.add_vendor("Acme", "sales@acme.example");
    let request = store.add_request("Laptops", Some(Utc::now()));
    store.associate(request.id, vendor.id);

    let first = envelope("<1@x>", "sales@acme.example", "Re: RFP", "First quote");
    let h = harness(
        store,
        MockGenerator::new().with_response(LAPTOP_REPLY),
        StaticMailbox::default(),
    );
    let MessageOutcome::Complete { proposal_id } = h.orchestrator.process_envelope(&first).await else {
        panic!("first reply should be ingested");
    };
    let before = h.store.proposals();
    let items_before = h.store.items_for(proposal_id);

    let second = envelope("<2@x>", "sales@acme.example", "Re: RFP", "Revised quote");
    let outcome = h.orchestrator.process_envelope(&second).await;

    assert_eq!(
        outcome,
        MessageOutcome::Skipped(SkipReason::AlreadyIngested {
            proposal_id: Some(proposal_id)
        })
    );
    assert_eq!(h.store.proposals(), before);
    assert_eq!(h.store.items_for(proposal_id), items_before);
    // Only the first message reached the extraction service.
    assert_eq!(h.generator.call_count(), 1);
    assert!(!h.ledger.should_process("<2@x>").await);
}

#[tokio::test]
async fn running_twice_yields_one_proposal() {
    let store = Arc::new(InMemoryStore::new());
    let vendor = store.add_vendor("Acme", "sales@acme.example");
    let request = store.add_request("Laptops", Some(Utc::now()));
    store.associate(request.id, vendor.id);

    let mail = envelope("<1@x>", "sales@acme.example", "Re: RFP", "Quote");
    let h = harness(
        store.clone(),
        MockGenerator::new().with_response(LAPTOP_REPLY),
        StaticMailbox::new(vec![mail.clone()]),
    );

    let first = h.orchestrator.run(SearchCriterion::Unseen).await.unwrap();
    let second = h.orchestrator.run(SearchCriterion::Unseen).await.unwrap();

    assert_eq!(first.complete, 1);
    assert_eq!(second.complete, 0);
    assert_eq!(second.outcomes[0].1, MessageOutcome::Skipped(SkipReason::Duplicate));
    assert_eq!(store.proposal_count(), 1);
    assert_eq!(h.mailbox.polls(), vec![SearchCriterion::Unseen, SearchCriterion::Unseen]);

    // A restarted process has an empty ledger; storage still holds the line.
    let restarted = harness(
        store.clone(),
        MockGenerator::new().with_response(LAPTOP_REPLY),
        StaticMailbox::new(vec![mail]),
    );
    let third = restarted.orchestrator.run(SearchCriterion::Unseen).await.unwrap();
    assert_eq!(third.skipped, 1);
    assert_eq!(store.proposal_count(), 1);
    assert_eq!(restarted.generator.call_count(), 0);
}

#[tokio::test]
async fn sequence_ids_are_never_remembered() {
    let store = Arc::new(InMemoryStore::new());
    let acme = store.add_vendor("Acme", "sales@acme.example");
    let globex = store.add_vendor("Globex", "bids@globex.example");
    let request = store.add_request("Laptops", Some(Utc::now()));
    store.associate(request.id, acme.id);
    store.associate(request.id, globex.id);

    let h = harness(
        store.clone(),
        MockGenerator::new().with_response(LAPTOP_REPLY).with_response(LAPTOP_REPLY),
        StaticMailbox::default(),
    );

    // After an expunge a different reply can land on the same sequence number.
    let from_acme = envelope("seq:3", "sales@acme.example", "Re: RFP", "Acme quote");
    let from_globex = envelope("seq:3", "bids@globex.example", "Re: RFP", "Globex quote");

    assert!(matches!(
        h.orchestrator.process_envelope(&from_acme).await,
        MessageOutcome::Complete { .. }
    ));
    assert!(h.ledger.should_process("seq:3").await);
    assert!(matches!(
        h.orchestrator.process_envelope(&from_globex).await,
        MessageOutcome::Complete { .. }
    ));

    let vendors: Vec<_> = store.proposals().iter().map(|p| p.vendor_id).collect();
    assert_eq!(vendors.len(), 2);
    assert!(vendors.contains(&acme.id) && vendors.contains(&globex.id));

    // Storage still stops a repeat of the same reply.
    let again = h.orchestrator.process_envelope(&from_acme).await;
    assert!(matches!(again, MessageOutcome::Skipped(SkipReason::AlreadyIngested { .. })));
    assert_eq!(store.proposal_count(), 2);
}

#[tokio::test]
async fn uid_based_ids_are_remembered() {
    let store = Arc::new(InMemoryStore::new());
    let vendor = store.add_vendor("Acme", "sales@acme.example");
    let request = store.add_request("Laptops", Some(Utc::now()));
    store.associate(request.id, vendor.id);

    let h = harness(
        store.clone(),
        MockGenerator::new().with_response(LAPTOP_REPLY),
        StaticMailbox::default(),
    );
    let mail = envelope("uid:1700:42", "sales@acme.example", "Re: RFP", "Quote");

    h.orchestrator.process_envelope(&mail).await;
    assert!(!h.ledger.should_process("uid:1700:42").await);
    assert_eq!(
        h.orchestrator.process_envelope(&mail).await,
        MessageOutcome::Skipped(SkipReason::Duplicate)
    );
}

#[tokio::test]
async fn insert_race_is_treated_as_already_ingested() {
    let store = Arc::new(InMemoryStore::new());
    let vendor = store.add_vendor("Acme", "sales@acme.example");
    let request = store.add_request("Laptops", Some(Utc::now()));
    store.associate(request.id, vendor.id);

    let h = harness(
        store.clone(),
        MockGenerator::new().with_response(LAPTOP_REPLY).with_response(LAPTOP_REPLY),
        StaticMailbox::default(),
    );
    let first = envelope("<1@x>", "sales@acme.example", "Re: RFP", "Quote");
    assert!(matches!(
        h.orchestrator.process_envelope(&first).await,
        MessageOutcome::Complete { .. }
    ));

    store.simulate_race();
    let second = envelope("<2@x>", "sales@acme.example", "Re: RFP", "Quote again");
    let outcome = h.orchestrator.process_envelope(&second).await;

    assert_eq!(
        outcome,
        MessageOutcome::Skipped(SkipReason::AlreadyIngested { proposal_id: None })
    );
    assert_eq!(store.proposal_count(), 1);
}

#[tokio::test]
async fn most_recently_sent_request_receives_the_reply() {
    let store = Arc::new(InMemoryStore::new());
    let vendor = store.add_vendor("Acme", "sales@acme.example");
    let now = Utc::now();
    let day_one = store.add_request("Chairs", Some(now - ChronoDuration::days(4)));
    let day_five = store.add_request("Desks", Some(now));
    store.associate(day_one.id, vendor.id);
    store.associate(day_five.id, vendor.id);

    let h = harness(
        store.clone(),
        MockGenerator::new().with_response(r#"{"totalPrice": 500}"#),
        StaticMailbox::default(),
    );
    let mail = envelope("<1@x>", "sales@acme.example", "Re: Chairs", "About the chairs");
    h.orchestrator.process_envelope(&mail).await;

    let proposals = store.proposals();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].request_id, day_five.id);
}

#[tokio::test]
async fn one_failing_message_does_not_stop_the_run() {
    let store = Arc::new(InMemoryStore::new());
    let acme = store.add_vendor("Acme", "sales@acme.example");
    let globex = store.add_vendor("Globex", "bids@globex.example");
    let request = store.add_request("Laptops", Some(Utc::now()));
    store.associate(request.id, acme.id);
    store.associate(request.id, globex.id);

    let mails = vec![
        envelope("<1@x>", "sales@acme.example", "Re: RFP", "Quote"),
        envelope("<2@x>", "nobody@example.com", "Hello", "Spam"),
        envelope("<3@x>", "bids@globex.example", "Re: RFP", "Quote"),
    ];
    let h = harness(
        store.clone(),
        MockGenerator::new()
            .with_response("I'm sorry, I can't help with that.")
            .with_response(LAPTOP_REPLY),
        StaticMailbox::new(mails),
    );

    let report = h.orchestrator.run(SearchCriterion::Unseen).await.unwrap();

    assert_eq!(report.fetched, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(report.complete, 1);
    assert!(matches!(report.outcomes[0].1, MessageOutcome::Failed(_)));

    let proposals = store.proposals();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].vendor_id, globex.id);

    // Failed messages are retried on the next run.
    assert!(h.ledger.should_process("<1@x>").await);
}

#[tokio::test(start_paused = true)]
async fn exhausted_rate_limits_fail_the_message() {
    let store = Arc::new(InMemoryStore::new());
    let vendor = store.add_vendor("Acme", "sales@acme.example");
    let request = store.add_request("Laptops", Some(Utc::now()));
    store.associate(request.id, vendor.id);

    let h = harness(
        store.clone(),
        MockGenerator::new().always_rate_limited(),
        StaticMailbox::default(),
    );
    let mail = envelope("<1@x>", "sales@acme.example", "Re: RFP", "Quote");

    let outcome = h.orchestrator.process_envelope(&mail).await;

    assert!(matches!(outcome, MessageOutcome::Failed(_)));
    assert_eq!(h.generator.call_count(), 3);
    assert_eq!(store.proposal_count(), 0);
}

#[tokio::test]
async fn mailbox_failure_fails_only_the_run() {
    let store = Arc::new(InMemoryStore::new());
    let h = harness(store, MockGenerator::new(), StaticMailbox::unreachable());

    assert!(h.orchestrator.run(SearchCriterion::Unseen).await.is_err());
    // The orchestrator stays usable for the next scheduled run.
    assert!(h.orchestrator.run(SearchCriterion::Unseen).await.is_err());
    assert_eq!(h.mailbox.polls().len(), 2);
}

#[tokio::test]
async fn poller_skips_while_a_run_is_active() {
    let store = Arc::new(InMemoryStore::new());
    let h = harness(store, MockGenerator::new(), StaticMailbox::new(Vec::new()));
    let poller = Poller::new(h.orchestrator.clone(), false);

    let permit = poller.guard().try_acquire().expect("guard is free");
    assert!(matches!(poller.poll_once().await, PollResult::SkippedActive));

    drop(permit);
    assert!(matches!(poller.poll_once().await, PollResult::Finished(_)));
}

#[tokio::test]
async fn overlapping_runs_are_allowed_when_configured() {
    let store = Arc::new(InMemoryStore::new());
    let h = harness(store, MockGenerator::new(), StaticMailbox::new(Vec::new()));
    let poller = Poller::new(h.orchestrator.clone(), true);

    let _permit = poller.guard().try_acquire().expect("guard is free");
    assert!(matches!(poller.poll_once().await, PollResult::Finished(_)));
}
