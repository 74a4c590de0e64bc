use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Vendor::Table)
                    .if_not_exists()
                    .col(pk_uuid(Vendor::Id))
                    .col(string(Vendor::Name))
                    .col(string_uniq(Vendor::Email))
                    .col(string_null(Vendor::ContactPerson))
                    .col(string_null(Vendor::Phone))
                    .col(string_null(Vendor::Category))
                    .col(boolean(Vendor::IsActive).default(true))
                    .col(text_null(Vendor::Notes))
                    .col(timestamp_with_time_zone(Vendor::CreatedAt))
                    .col(timestamp_with_time_zone(Vendor::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Request::Table)
                    .if_not_exists()
                    .col(pk_uuid(Request::Id))
                    .col(string(Request::Title))
                    .col(text_null(Request::Description))
                    .col(double_null(Request::Budget))
                    .col(integer_null(Request::DeadlineDays))
                    .col(string_null(Request::PaymentTerms))
                    .col(string_null(Request::Warranty))
                    .col(json(Request::Requirements))
                    .col(string_len(Request::Status, 16).default("draft"))
                    .col(timestamp_with_time_zone_null(Request::SentAt))
                    .col(timestamp_with_time_zone(Request::CreatedAt))
                    .col(timestamp_with_time_zone(Request::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RequestVendor::Table)
                    .if_not_exists()
                    .col(uuid(RequestVendor::RequestId))
                    .col(uuid(RequestVendor::VendorId))
                    .primary_key(
                        Index::create()
                            .col(RequestVendor::RequestId)
                            .col(RequestVendor::VendorId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_request_vendor_request")
                            .from(RequestVendor::Table, RequestVendor::RequestId)
                            .to(Request::Table, Request::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_request_vendor_vendor")
                            .from(RequestVendor::Table, RequestVendor::VendorId)
                            .to(Vendor::Table, Vendor::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_requests_sent_at")
                    .table(Request::Table)
                    .col(Request::SentAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RequestVendor::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Request::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Vendor::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Vendor {
    #[sea_orm(iden = "vendors")]
    Table,
    Id,
    Name,
    Email,
    ContactPerson,
    Phone,
    Category,
    IsActive,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Request {
    #[sea_orm(iden = "requests")]
    Table,
    Id,
    Title,
    Description,
    Budget,
    DeadlineDays,
    PaymentTerms,
    Warranty,
    Requirements,
    Status,
    SentAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RequestVendor {
    #[sea_orm(iden = "request_vendors")]
    Table,
    RequestId,
    VendorId,
}
