use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

use crate::graphql::types::RequestStatus;

/// One line of a request's structured requirements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementItem {
    pub item_name: String,
    pub quantity: Option<i32>,
    pub specifications: Option<String>,
}

/// Ordered requirement list, stored as a JSON column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Requirements(pub Vec<RequirementItem>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(column_type = "Double", nullable)]
    pub budget: Option<f64>,
    pub deadline_days: Option<i32>,
    pub payment_terms: Option<String>,
    pub warranty: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub requirements: Requirements,
    pub status: RequestStatus,
    /// Set when the request is sent; only sent requests can receive replies.
    pub sent_at: Option<DateTimeWithTimeZone>,
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

impl Related<super::vendor::Entity> for Entity {
    fn to() -> RelationDef {
        super::request_vendor::Relation::Vendor.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::request_vendor::Relation::Request.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Requirements serialized for prompts. Falls back to the description, then the title,
    /// when no structured lines were captured.
    pub fn requirements_context(&self) -> String {
        if !self.requirements.0.is_empty() {
            return serde_json::to_string(&self.requirements.0).unwrap_or_else(|_| "[]".to_string());
        }
        self.description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| self.title.clone())
    }
}
