use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One product line within an order, owned by the product's producer for
/// fulfillment purposes. `unit_price` is a snapshot taken at order creation
/// and never updated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub unit_price: Decimal,
    pub fulfillment_status: FulfillmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Per-line shipping progress, independent of payment status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "packed")]
    Packed,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl FulfillmentStatus {
    /// A delivered item can never be cancelled; everything else may move
    /// forwards, backwards (producer corrections) or into `cancelled`.
    pub fn can_transition_to(self, next: FulfillmentStatus) -> bool {
        !(self == FulfillmentStatus::Delivered && next == FulfillmentStatus::Cancelled)
    }

    /// Position in the fulfillment pipeline, used when aggregating an
    /// order's overall stage from its items.
    pub fn stage(self) -> u8 {
        match self {
            FulfillmentStatus::Pending => 0,
            FulfillmentStatus::Packed => 1,
            FulfillmentStatus::Shipped => 2,
            FulfillmentStatus::Delivered => 3,
            FulfillmentStatus::Cancelled => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "pending",
            FulfillmentStatus::Packed => "packed",
            FulfillmentStatus::Shipped => "shipped",
            FulfillmentStatus::Delivered => "delivered",
            FulfillmentStatus::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FulfillmentStatus::*;

    #[test]
    fn delivered_cannot_be_cancelled() {
        assert!(!Delivered.can_transition_to(Cancelled));
    }

    #[test]
    fn all_other_transitions_are_allowed() {
        for from in [Pending, Packed, Shipped, Cancelled] {
            for to in [Pending, Packed, Shipped, Delivered, Cancelled] {
                assert!(from.can_transition_to(to));
            }
        }
        assert!(Delivered.can_transition_to(Pending));
        assert!(Delivered.can_transition_to(Delivered));
    }
}
