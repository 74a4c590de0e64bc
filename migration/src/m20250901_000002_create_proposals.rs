use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250901_000001_create_vendors_and_requests::{Request, Vendor};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Proposal::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Proposal::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                    )
                    .col(ColumnDef::new(Proposal::RequestId).uuid().not_null())
                    .col(ColumnDef::new(Proposal::VendorId).uuid().not_null())
                    .col(ColumnDef::new(Proposal::TotalPrice).double().null())
                    .col(ColumnDef::new(Proposal::DeliveryDays).integer().null())
                    .col(ColumnDef::new(Proposal::PaymentTerms).text().null())
                    .col(ColumnDef::new(Proposal::Warranty).text().null())
                    .col(ColumnDef::new(Proposal::RawEmailBody).text().not_null())
                    .col(ColumnDef::new(Proposal::AiSummary).text().null())
                    .col(ColumnDef::new(Proposal::AiScore).double().null())
                    .col(ColumnDef::new(Proposal::SourceMessageId).string().null())
                    .col(
                        ColumnDef::new(Proposal::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                    )
                    .col(
                        ColumnDef::new(Proposal::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                    )
                    .col(
                        ColumnDef::new(Proposal::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_proposal_request")
                            .from(Proposal::Table, Proposal::RequestId)
                            .to(Request::Table, Request::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_proposal_vendor")
                            .from(Proposal::Table, Proposal::VendorId)
                            .to(Vendor::Table, Vendor::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                    )
                    .to_owned(),
            )
            .await?;

        // One proposal per (request, vendor); ingestion relies on this to stay idempotent.
        manager
            .create_index(
                Index::create()
                    .name("uq_proposals_request_vendor")
                    .table(Proposal::Table)
                    .col(Proposal::RequestId)
                    .col(Proposal::VendorId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProposalItem::Table)
                    .if_not_exists()
                    .col(pk_uuid(ProposalItem::Id))
                    .col(uuid(ProposalItem::ProposalId))
                    .col(string(ProposalItem::ItemName))
                    .col(integer_null(ProposalItem::Quantity))
                    .col(double_null(ProposalItem::UnitPrice))
                    .col(double_null(ProposalItem::TotalPrice))
                    .col(text_null(ProposalItem::Specifications))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_proposal_item_proposal")
                            .from(ProposalItem::Table, ProposalItem::ProposalId)
                            .to(Proposal::Table, Proposal::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProposalItem::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Proposal::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Proposal {
    #[sea_orm(iden = "proposals")]
    Table,
    Id,
    RequestId,
    VendorId,
    TotalPrice,
    DeliveryDays,
    PaymentTerms,
    Warranty,
    RawEmailBody,
    AiSummary,
    AiScore,
    SourceMessageId,
    ReceivedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProposalItem {
    #[sea_orm(iden = "proposal_items")]
    Table,
    Id,
    ProposalId,
    ItemName,
    Quantity,
    UnitPrice,
    TotalPrice,
    Specifications,
}
