use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vendors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// Lowercased; inbound mail is matched on this column.
    #[sea_orm(unique)]
    pub email: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub category: Option<String>,
    pub is_active: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::proposal::Entity")]
    Proposal,
    #[sea_orm(has_many = "super::request_vendor::Entity")]
    RequestVendor,
}

impl Related<super::proposal::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Proposal.def()
    }
}

impl Related<super::request_vendor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequestVendor.def()
    }
}

impl Related<super::request::Entity> for Entity {
    fn to() -> RelationDef {
        super::request_vendor::Relation::Request.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::request_vendor::Relation::Vendor.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
