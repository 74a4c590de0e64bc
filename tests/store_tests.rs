//! `SeaOrmStore` and the admin services against a migrated in-memory SQLite database.

use std::time::Duration;

use migration::{Migrator, MigratorTrait};
use procurely::entities::prelude::{Proposal, ProposalItem};
use procurely::entities::request::RequirementItem;
use procurely::error::{ServiceError, StoreError};
use procurely::graphql::types::RequestStatus;
use procurely::services::store::{NewProposal, NewProposalItem, ProcurementStore};
use procurely::services::{NewRequest, NewVendor, RequestService, SeaOrmStore, VendorService};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, EntityTrait, PaginatorTrait};
use uuid::Uuid;

async fn setup() -> DatabaseConnection {
    // One connection: every pooled connection would otherwise get its own empty database.
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("sqlite should open");
    Migrator::up(&db, None).await.expect("migrations should apply");
    db
}

async fn vendor(db: &DatabaseConnection, name: &str, email: &str) -> Uuid {
    VendorService::new(db.clone())
        .create_vendor(NewVendor {
            name: name.to_string(),
            email: email.to_string(),
            ..Default::default()
        })
        .await
        .expect("vendor should be created")
        .id
}

async fn sent_request(db: &DatabaseConnection, title: &str, vendor_ids: Vec<Uuid>) -> Uuid {
    let requests = RequestService::new(db.clone());
    let request = requests
        .create_request(NewRequest {
            title: title.to_string(),
            requirements: vec![RequirementItem {
                item_name: "Laptop".to_string(),
                quantity: Some(20),
                specifications: Some("16GB RAM".to_string()),
            }],
            ..Default::default()
        })
        .await
        .expect("request should be created");
    requests
        .mark_request_sent(request.id, vendor_ids)
        .await
        .expect("request should be sent");
    request.id
}

fn new_proposal(request_id: Uuid, vendor_id: Uuid) -> NewProposal {
    NewProposal {
        request_id,
        vendor_id,
        total_price: Some(22000.0),
        delivery_days: Some(14),
        payment_terms: Some("Net 30".to_string()),
        warranty: Some("1 year".to_string()),
        raw_email_body: "We can supply 20 laptops.".to_string(),
        ai_summary: Some("20 laptops".to_string()),
        source_message_id: Some("<1@x>".to_string()),
        items: vec![NewProposalItem {
            item_name: "Laptop".to_string(),
            quantity: Some(20),
            unit_price: Some(1100.0),
            total_price: Some(22000.0),
            specifications: None,
        }],
    }
}

#[tokio::test]
async fn second_proposal_for_same_pair_is_rejected() {
    let db = setup().await;
    let vendor_id = vendor(&db, "Acme", "sales@acme.example").await;
    let request_id = sent_request(&db, "Laptops", vec![vendor_id]).await;
    let store = SeaOrmStore::new(db.clone());

    store.create_proposal(new_proposal(request_id, vendor_id)).await.unwrap();
    let err = store
        .create_proposal(new_proposal(request_id, vendor_id))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Duplicate { .. }));
    assert_eq!(Proposal::find().count(&db).await.unwrap(), 1);
    // The failed transaction left no orphan items behind.
    assert_eq!(ProposalItem::find().count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn proposals_come_back_with_vendor_and_items() {
    let db = setup().await;
    let vendor_id = vendor(&db, "Acme", "Sales@Acme.example").await;
    let request_id = sent_request(&db, "Laptops", vec![vendor_id]).await;
    let store = SeaOrmStore::new(db.clone());

    let proposal_id = store.create_proposal(new_proposal(request_id, vendor_id)).await.unwrap();
    assert_eq!(
        store.find_proposal_id(request_id, vendor_id).await.unwrap(),
        Some(proposal_id)
    );

    let records = store.proposals_for_request(request_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].vendor_name, "Acme");
    assert_eq!(records[0].vendor_email, "sales@acme.example");
    assert_eq!(records[0].items.len(), 1);
    assert_eq!(records[0].items[0].unit_price, Some(1100.0));

    store.record_score(proposal_id, 87.5).await.unwrap();
    let record = store.find_proposal(proposal_id).await.unwrap().unwrap();
    assert_eq!(record.proposal.ai_score, Some(87.5));
}

#[tokio::test]
async fn deleting_a_vendor_cascades_to_proposals_and_items() {
    let db = setup().await;
    let vendor_id = vendor(&db, "Acme", "sales@acme.example").await;
    let request_id = sent_request(&db, "Laptops", vec![vendor_id]).await;
    let store = SeaOrmStore::new(db.clone());
    store.create_proposal(new_proposal(request_id, vendor_id)).await.unwrap();

    assert!(VendorService::new(db.clone()).delete_vendor(vendor_id).await.unwrap());

    assert_eq!(Proposal::find().count(&db).await.unwrap(), 0);
    assert_eq!(ProposalItem::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn vendor_lookup_ignores_case_and_latest_sent_request_wins() {
    let db = setup().await;
    let vendor_id = vendor(&db, "Acme", "sales@acme.example").await;
    let older = sent_request(&db, "Chairs", vec![vendor_id]).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let newer = sent_request(&db, "Desks", vec![vendor_id]).await;
    let store = SeaOrmStore::new(db.clone());

    let found = store.find_vendor_by_email("SALES@acme.example").await.unwrap();
    assert_eq!(found.map(|v| v.id), Some(vendor_id));

    let latest = store.latest_sent_request_for_vendor(vendor_id).await.unwrap().unwrap();
    assert_eq!(latest.id, newer);
    assert_ne!(latest.id, older);
    assert_eq!(latest.status, RequestStatus::Sent);
    assert_eq!(latest.requirements.0[0].item_name, "Laptop");
}

#[tokio::test]
async fn draft_requests_are_not_matched() {
    let db = setup().await;
    let vendor_id = vendor(&db, "Acme", "sales@acme.example").await;
    let requests = RequestService::new(db.clone());
    let draft = requests
        .create_request(NewRequest {
            title: "Draft".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    requests.set_request_vendors(draft.id, vec![vendor_id]).await.unwrap();

    let store = SeaOrmStore::new(db.clone());
    assert!(store.latest_sent_request_for_vendor(vendor_id).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_vendor_email_is_a_conflict() {
    let db = setup().await;
    vendor(&db, "Acme", "sales@acme.example").await;

    let err = VendorService::new(db.clone())
        .create_vendor(NewVendor {
            name: "Acme again".to_string(),
            email: "  SALES@ACME.EXAMPLE ".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn vendors_are_frozen_once_sent() {
    let db = setup().await;
    let vendor_id = vendor(&db, "Acme", "sales@acme.example").await;
    let other = vendor(&db, "Globex", "bids@globex.example").await;
    let request_id = sent_request(&db, "Laptops", vec![vendor_id]).await;

    let requests = RequestService::new(db.clone());
    let err = requests.set_request_vendors(request_id, vec![other]).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    // Sending again may still add vendors.
    requests.mark_request_sent(request_id, vec![other]).await.unwrap();
    assert_eq!(requests.vendors_for_request(request_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn sending_requires_a_vendor() {
    let db = setup().await;
    let requests = RequestService::new(db.clone());
    let request = requests
        .create_request(NewRequest {
            title: "Lonely".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let err = requests.mark_request_sent(request.id, Vec::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn request_listing_counts_proposals() {
    let db = setup().await;
    let acme = vendor(&db, "Acme", "sales@acme.example").await;
    let globex = vendor(&db, "Globex", "bids@globex.example").await;
    let request_id = sent_request(&db, "Laptops", vec![acme, globex]).await;
    let store = SeaOrmStore::new(db.clone());
    store.create_proposal(new_proposal(request_id, acme)).await.unwrap();
    store.create_proposal(new_proposal(request_id, globex)).await.unwrap();

    let summaries = RequestService::new(db.clone()).list_requests().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].proposal_count, 2);
}
