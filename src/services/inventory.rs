use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::warn;
use uuid::Uuid;

use crate::{
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
};

/// Guards product stock against overselling under concurrent checkouts.
///
/// The decrement is a single conditional UPDATE executed inside the
/// caller's transaction: it succeeds only if the resulting inventory stays
/// non-negative. Pre-fetched snapshots are never trusted for the decision;
/// two concurrent checkouts racing for the last unit resolve to exactly one
/// winner at the storage layer.
pub struct StockGuard;

impl StockGuard {
    /// Atomically decrements `quantity` units of stock for `product_id`.
    /// Returns `InsufficientStock` (and leaves the caller to roll back the
    /// whole order) when the product is missing or short.
    pub async fn reserve_and_decrement<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let result = ProductEntity::update_many()
            .col_expr(
                product::Column::Inventory,
                Expr::col(product::Column::Inventory).sub(Expr::val(quantity)),
            )
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Inventory.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            // Re-read only to produce a precise error; the decision above
            // was already made atomically.
            let product = ProductEntity::find_by_id(product_id).one(conn).await?;
            return Err(match product {
                Some(p) => {
                    warn!(product_id = %product_id, available = p.inventory, required = quantity, "Stock check failed");
                    ServiceError::InsufficientStock(format!(
                        "Insufficient stock for {}. Available: {}, Required: {}",
                        p.title, p.inventory, quantity
                    ))
                }
                None => ServiceError::NotFound(format!("Product {} not found", product_id)),
            });
        }

        Ok(())
    }

    /// Advisory availability check used before creating a payment intent.
    /// Not authoritative: the conditional decrement re-checks at placement
    /// time.
    pub fn check_available(product: &product::Model, quantity: i32) -> Result<(), ServiceError> {
        if product.inventory < quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Insufficient stock for {}. Available: {}, Required: {}",
                product.title, product.inventory, quantity
            )));
        }
        Ok(())
    }
}
