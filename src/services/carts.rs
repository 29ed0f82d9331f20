use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        cart::{self, Entity as CartEntity},
        cart_item::{self, Entity as CartItemEntity},
        product,
    },
    errors::ServiceError,
};

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart: cart::Model,
    pub items: Vec<CartLineResponse>,
}

#[derive(Debug, Serialize)]
pub struct CartLineResponse {
    pub item: cart_item::Model,
    pub product: product::Model,
}

/// Cart maintenance for buyers. One cart per buyer, created on first use;
/// checkout consumes the lines inside the placement transaction.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Fetches the buyer's cart with product details, creating an empty
    /// cart if the buyer has none yet.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, buyer_id: Uuid) -> Result<CartResponse, ServiceError> {
        let cart = self.get_or_create_cart(buyer_id).await?;
        let items = Self::lines_for_cart(&*self.db, cart.id).await?;
        Ok(CartResponse {
            cart,
            items: items
                .into_iter()
                .map(|(item, product)| CartLineResponse { item, product })
                .collect(),
        })
    }

    /// Adds a product to the cart, or bumps/replaces the existing line's
    /// quantity. `replace` sets the quantity instead of accumulating.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        buyer_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        replace: bool,
    ) -> Result<cart_item::Model, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let product = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let cart = self.get_or_create_cart(buyer_id).await?;
        let existing = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product.id))
            .one(&*self.db)
            .await?;

        let now = Utc::now();
        let model = match existing {
            Some(item) => {
                let new_quantity = if replace {
                    quantity
                } else {
                    item.quantity + quantity
                };
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(new_quantity.max(1));
                active.updated_at = Set(Some(now));
                active.update(&*self.db).await?
            }
            None => {
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    quantity: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(Some(now)),
                };
                item.insert(&*self.db).await?
            }
        };

        Ok(model)
    }

    /// Removes a product line from the buyer's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        buyer_id: Uuid,
        product_id: Uuid,
    ) -> Result<(), ServiceError> {
        let cart = self.get_or_create_cart(buyer_id).await?;
        CartItemEntity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    pub async fn get_or_create_cart(&self, buyer_id: Uuid) -> Result<cart::Model, ServiceError> {
        if let Some(cart) = CartEntity::find()
            .filter(cart::Column::BuyerId.eq(buyer_id))
            .one(&*self.db)
            .await?
        {
            return Ok(cart);
        }

        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            buyer_id: Set(buyer_id),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        match cart.insert(&*self.db).await {
            Ok(model) => Ok(model),
            Err(err) if ServiceError::is_unique_violation(&err) => CartEntity::find()
                .filter(cart::Column::BuyerId.eq(buyer_id))
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::InternalError("cart vanished after creation race".to_string())
                }),
            Err(err) => Err(err.into()),
        }
    }

    /// Loads cart lines joined with their products on any connection,
    /// including inside an order-placement transaction.
    pub async fn lines_for_cart<C: ConnectionTrait>(
        conn: &C,
        cart_id: Uuid,
    ) -> Result<Vec<(cart_item::Model, product::Model)>, ServiceError> {
        let rows = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .find_also_related(product::Entity)
            .all(conn)
            .await?;

        rows.into_iter()
            .map(|(item, product)| {
                let product = product.ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "cart line {} references missing product",
                        item.id
                    ))
                })?;
                Ok((item, product))
            })
            .collect()
    }
}
