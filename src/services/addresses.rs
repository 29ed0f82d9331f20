use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::address::{self, Entity as AddressEntity},
    errors::ServiceError,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateAddressRequest {
    pub label: Option<String>,
    #[validate(length(min = 1, message = "Contact name is required"))]
    pub contact_name: String,
    #[validate(length(min = 4, message = "Contact phone is required"))]
    pub contact_phone: String,
    #[validate(length(min = 1, message = "Address line is required"))]
    pub address_line1: String,
    pub address_line2: Option<String>,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
    pub country: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// Buyer address book. The engine only ever consumes [`assert_owned`];
/// list/create round out the surface the mobile client uses.
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DbPool>,
}

impl AddressService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Confirms the address exists and belongs to the buyer. Used as a
    /// precondition for every order placement path.
    pub async fn assert_owned(
        &self,
        buyer_id: Uuid,
        address_id: Uuid,
    ) -> Result<address::Model, ServiceError> {
        AddressEntity::find()
            .filter(address::Column::Id.eq(address_id))
            .filter(address::Column::BuyerId.eq(buyer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::InvalidInput("Invalid address selected".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list(&self, buyer_id: Uuid) -> Result<Vec<address::Model>, ServiceError> {
        let addresses = AddressEntity::find()
            .filter(address::Column::BuyerId.eq(buyer_id))
            .order_by_desc(address::Column::IsDefault)
            .order_by_desc(address::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(addresses)
    }

    #[instrument(skip(self, request))]
    pub async fn create(
        &self,
        buyer_id: Uuid,
        request: CreateAddressRequest,
    ) -> Result<address::Model, ServiceError> {
        request.validate()?;

        let now = Utc::now();
        let model = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            buyer_id: Set(buyer_id),
            label: Set(request.label),
            contact_name: Set(request.contact_name),
            contact_phone: Set(request.contact_phone),
            address_line1: Set(request.address_line1),
            address_line2: Set(request.address_line2),
            city: Set(request.city),
            state: Set(request.state),
            postal_code: Set(request.postal_code),
            country: Set(request.country.unwrap_or_else(|| "India".to_string())),
            is_default: Set(request.is_default),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        Ok(model.insert(&*self.db).await?)
    }
}
