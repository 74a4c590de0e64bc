use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::entities::{prelude::*, vendor};
use crate::error::ServiceError;

#[derive(Debug, Clone, Default)]
pub struct NewVendor {
    pub name: String,
    pub email: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub category: Option<String>,
    pub notes: Option<String>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct VendorChanges {
    pub name: Option<String>,
    pub contact_person: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub category: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub notes: Option<Option<String>>,
}

/// Inbound mail is matched on the normalised form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct VendorService {
    db: DatabaseConnection,
}

impl VendorService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new vendor
    pub async fn create_vendor(&self, input: NewVendor) -> Result<vendor::Model, ServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::Validation("Vendor name is required".to_string()));
        }

        let email = normalize_email(&input.email);
        if !email.contains('@') {
            return Err(ServiceError::Validation(format!("Invalid vendor email: {}", input.email)));
        }

        if Vendor::find()
            .filter(vendor::Column::Email.eq(email.as_str()))
            .one(&self.db)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "A vendor with email {} already exists",
                email
            )));
        }

        let now = Utc::now();
        let new_vendor = vendor::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            email: Set(email),
            contact_person: Set(input.contact_person),
            phone: Set(input.phone),
            category: Set(input.category),
            is_active: Set(true),
            notes: Set(input.notes),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        Ok(new_vendor.insert(&self.db).await?)
    }

    pub async fn list_vendors(&self, active_only: bool) -> Result<Vec<vendor::Model>, ServiceError> {
        let mut query = Vendor::find();
        if active_only {
            query = query.filter(vendor::Column::IsActive.eq(true));
        }
        Ok(query.order_by_asc(vendor::Column::Name).all(&self.db).await?)
    }

    pub async fn get_vendor(&self, vendor_id: Uuid) -> Result<Option<vendor::Model>, ServiceError> {
        Ok(Vendor::find_by_id(vendor_id).one(&self.db).await?)
    }

    pub async fn update_vendor(
        &self,
        vendor_id: Uuid,
        changes: VendorChanges,
    ) -> Result<vendor::Model, ServiceError> {
        let vendor = Vendor::find_by_id(vendor_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Vendor {}", vendor_id)))?;

        let mut vendor_active: vendor::ActiveModel = vendor.into();

        if let Some(name) = changes.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::Validation("Vendor name is required".to_string()));
            }
            vendor_active.name = Set(name);
        }

        if let Some(contact_person) = changes.contact_person {
            vendor_active.contact_person = Set(contact_person);
        }

        if let Some(phone) = changes.phone {
            vendor_active.phone = Set(phone);
        }

        if let Some(category) = changes.category {
            vendor_active.category = Set(category);
        }

        if let Some(is_active) = changes.is_active {
            vendor_active.is_active = Set(is_active);
        }

        if let Some(notes) = changes.notes {
            vendor_active.notes = Set(notes);
        }

        vendor_active.updated_at = Set(Utc::now().into());

        Ok(vendor_active.update(&self.db).await?)
    }

    /// Delete a vendor together with its request links and proposals.
    pub async fn delete_vendor(&self, vendor_id: Uuid) -> Result<bool, ServiceError> {
        let vendor = Vendor::find_by_id(vendor_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Vendor {}", vendor_id)))?;

        let result = vendor.delete(&self.db).await?;
        Ok(result.rows_affected > 0)
    }
}
