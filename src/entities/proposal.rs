use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A vendor's reply to a request. At most one row exists per (request_id, vendor_id).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "proposals")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub request_id: Uuid,
    pub vendor_id: Uuid,
    #[sea_orm(column_type = "Double", nullable)]
    pub total_price: Option<f64>,
    pub delivery_days: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub payment_terms: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub warranty: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub raw_email_body: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub ai_summary: Option<String>,
    #[sea_orm(column_type = "Double", nullable)]
    pub ai_score: Option<f64>,
    pub source_message_id: Option<String>,
    pub received_at: DateTimeWithTimeZone,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::request::Entity",
        from = "Column::RequestId",
        to = "super::request::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Request,
    #[sea_orm(
        belongs_to = "super::vendor::Entity",
        from = "Column::VendorId",
        to = "super::vendor::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Vendor,
    #[sea_orm(has_many = "super::proposal_item::Entity")]
    ProposalItems,
}

impl Related<super::request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Request.def()
    }
}

impl Related<super::vendor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vendor.def()
    }
}

impl Related<super::proposal_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProposalItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
