use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        cart_item,
        order::{self, Entity as OrderEntity, PaymentMethod, PaymentStatus},
        order_item::{self, Entity as OrderItemEntity, FulfillmentStatus},
        product::{self, Entity as ProductEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        addresses::AddressService, carts::CartService, inventory::StockGuard,
        payments::PaymentVerifier, wallets::WalletService,
    },
};

/// Request/response types for the order service

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderRequest {
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PlaceDirectOrderRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentRequest {
    pub address_id: Uuid,
    #[validate(length(min = 1, message = "Provider order reference is required"))]
    pub provider_order_ref: String,
    #[validate(length(min = 1, message = "Provider payment reference is required"))]
    pub provider_payment_ref: String,
    #[validate(length(min = 1, message = "Provider signature is required"))]
    pub provider_signature: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyDirectPaymentRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub address_id: Uuid,
    #[validate(length(min = 1, message = "Provider order reference is required"))]
    pub provider_order_ref: String,
    #[validate(length(min = 1, message = "Provider payment reference is required"))]
    pub provider_payment_ref: String,
    #[validate(length(min = 1, message = "Provider signature is required"))]
    pub provider_signature: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderPlacedResponse {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Serialize)]
pub struct OrderLineResponse {
    pub item: order_item::Model,
    pub product_title: String,
}

#[derive(Debug, Serialize)]
pub struct BuyerOrderResponse {
    pub order: order::Model,
    pub items: Vec<OrderLineResponse>,
}

#[derive(Debug, Serialize)]
pub struct ProducerOrderResponse {
    pub order_id: Uuid,
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Serialize)]
pub struct ProducerOrdersPage {
    pub items: Vec<ProducerOrderResponse>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub has_more: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProducerOrderStats {
    pub total: u64,
    pub pending: u64,
    pub packed: u64,
    pub shipped: u64,
    pub delivered: u64,
    pub cancelled: u64,
    pub revenue: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderStatusUpdateResponse {
    pub updated_item_ids: Vec<Uuid>,
    pub payment_status: PaymentStatus,
}

/// Who is asking for a payment-status change. Producers are restricted to
/// COD orders containing their items; admins may override any order.
#[derive(Debug, Clone, Copy)]
pub enum PaymentActor {
    Producer(Uuid),
    Admin(Uuid),
}

/// A checkout line resolved against the catalog: the product row as read
/// inside the placement transaction plus the requested quantity.
#[derive(Debug, Clone)]
struct CheckoutLine {
    product: product::Model,
    quantity: i32,
}

/// The order lifecycle engine: turns checkout requests into durable
/// orders, and mediates fulfillment/payment transitions with their ledger
/// side effects. All multi-row mutations run inside one transaction;
/// notifications are dispatched only after commit.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    verifier: PaymentVerifier,
    addresses: Arc<AddressService>,
    carts: Arc<CartService>,
    currency: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        verifier: PaymentVerifier,
        addresses: Arc<AddressService>,
        carts: Arc<CartService>,
        currency: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            verifier,
            addresses,
            carts,
            currency,
        }
    }

    /// Places a COD order from the buyer's cart. Prepaid requests must go
    /// through the payment-verification path instead; the order is only
    /// created after signature verification, never speculatively.
    #[instrument(skip(self, request), fields(buyer_id = %buyer_id))]
    pub async fn place_order(
        &self,
        buyer_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<OrderPlacedResponse, ServiceError> {
        request.validate()?;
        if request.payment_method == PaymentMethod::Prepaid {
            return Err(ServiceError::InvalidOperation(
                "For prepaid orders, initiate a payment intent first, then verify the payment"
                    .to_string(),
            ));
        }

        self.addresses
            .assert_owned(buyer_id, request.address_id)
            .await?;

        let cart = self.carts.get_or_create_cart(buyer_id).await?;

        let txn = self.db.begin().await?;
        let lines = Self::cart_checkout_lines(&txn, cart.id).await?;
        let order = Self::create_order_with_items(
            &txn,
            buyer_id,
            request.address_id,
            &lines,
            PaymentMethod::Cod,
            PaymentStatus::Pending,
            &self.currency,
            None,
        )
        .await?;
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!(order_id = %order.id, "COD order placed");
        self.emit_order_placed(&order, &lines).await;
        self.emit(Event::CartCleared(cart.id)).await;

        Ok(OrderPlacedResponse {
            order_id: order.id,
            payment_status: order.payment_status,
        })
    }

    /// Places a COD order for a single product ("buy now").
    #[instrument(skip(self, request), fields(buyer_id = %buyer_id))]
    pub async fn place_direct_order(
        &self,
        buyer_id: Uuid,
        request: PlaceDirectOrderRequest,
    ) -> Result<OrderPlacedResponse, ServiceError> {
        request.validate()?;
        if request.payment_method == PaymentMethod::Prepaid {
            return Err(ServiceError::InvalidOperation(
                "For prepaid orders, initiate a payment intent first, then verify the payment"
                    .to_string(),
            ));
        }

        self.addresses
            .assert_owned(buyer_id, request.address_id)
            .await?;

        let txn = self.db.begin().await?;
        let lines = Self::direct_checkout_lines(&txn, request.product_id, request.quantity).await?;
        let order = Self::create_order_with_items(
            &txn,
            buyer_id,
            request.address_id,
            &lines,
            PaymentMethod::Cod,
            PaymentStatus::Pending,
            &self.currency,
            None,
        )
        .await?;
        txn.commit().await?;

        info!(order_id = %order.id, "Direct COD order placed");
        self.emit_order_placed(&order, &lines).await;

        Ok(OrderPlacedResponse {
            order_id: order.id,
            payment_status: order.payment_status,
        })
    }

    /// Verifies a provider payment signature and places the prepaid order
    /// from the buyer's cart. Nothing is created on a signature mismatch;
    /// stock is re-validated at verification time; ledger credits post
    /// inside the same unit of work.
    #[instrument(skip(self, request), fields(buyer_id = %buyer_id))]
    pub async fn verify_and_place_prepaid_order(
        &self,
        buyer_id: Uuid,
        request: VerifyPaymentRequest,
    ) -> Result<OrderPlacedResponse, ServiceError> {
        request.validate()?;
        self.verifier.verify(
            &request.provider_order_ref,
            &request.provider_payment_ref,
            &request.provider_signature,
        )?;

        self.addresses
            .assert_owned(buyer_id, request.address_id)
            .await?;

        let cart = self.carts.get_or_create_cart(buyer_id).await?;

        let txn = self.db.begin().await?;
        let lines = Self::cart_checkout_lines(&txn, cart.id).await?;
        let order = Self::create_order_with_items(
            &txn,
            buyer_id,
            request.address_id,
            &lines,
            PaymentMethod::Prepaid,
            PaymentStatus::Paid,
            &self.currency,
            Some((
                request.provider_order_ref.as_str(),
                request.provider_payment_ref.as_str(),
                request.provider_signature.as_str(),
            )),
        )
        .await?;
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        let credits =
            Self::post_order_credits(&txn, &order, &lines, "payment credit").await?;
        txn.commit().await?;

        info!(order_id = %order.id, "Prepaid order verified and placed");
        self.emit_order_placed(&order, &lines).await;
        self.emit_credits(order.id, &credits).await;
        self.emit(Event::CartCleared(cart.id)).await;

        Ok(OrderPlacedResponse {
            order_id: order.id,
            payment_status: order.payment_status,
        })
    }

    /// Prepaid "buy now" variant of [`verify_and_place_prepaid_order`].
    #[instrument(skip(self, request), fields(buyer_id = %buyer_id))]
    pub async fn verify_and_place_direct_prepaid_order(
        &self,
        buyer_id: Uuid,
        request: VerifyDirectPaymentRequest,
    ) -> Result<OrderPlacedResponse, ServiceError> {
        request.validate()?;
        self.verifier.verify(
            &request.provider_order_ref,
            &request.provider_payment_ref,
            &request.provider_signature,
        )?;

        self.addresses
            .assert_owned(buyer_id, request.address_id)
            .await?;

        let txn = self.db.begin().await?;
        let lines = Self::direct_checkout_lines(&txn, request.product_id, request.quantity).await?;
        let order = Self::create_order_with_items(
            &txn,
            buyer_id,
            request.address_id,
            &lines,
            PaymentMethod::Prepaid,
            PaymentStatus::Paid,
            &self.currency,
            Some((
                request.provider_order_ref.as_str(),
                request.provider_payment_ref.as_str(),
                request.provider_signature.as_str(),
            )),
        )
        .await?;
        let credits =
            Self::post_order_credits(&txn, &order, &lines, "payment credit").await?;
        txn.commit().await?;

        info!(order_id = %order.id, "Direct prepaid order verified and placed");
        self.emit_order_placed(&order, &lines).await;
        self.emit_credits(order.id, &credits).await;

        Ok(OrderPlacedResponse {
            order_id: order.id,
            payment_status: order.payment_status,
        })
    }

    /// Updates a single line's fulfillment status. Only the producer that
    /// owns the line's product may transition it, and a delivered line can
    /// never be cancelled.
    #[instrument(skip(self), fields(producer_id = %producer_id, order_item_id = %order_item_id))]
    pub async fn update_item_fulfillment_status(
        &self,
        producer_id: Uuid,
        order_item_id: Uuid,
        new_status: FulfillmentStatus,
    ) -> Result<order_item::Model, ServiceError> {
        let (item, product) = OrderItemEntity::find_by_id(order_item_id)
            .find_also_related(ProductEntity)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order item {} not found", order_item_id))
            })?;

        let owned = product
            .map(|p| p.producer_id == producer_id)
            .unwrap_or(false);
        if !owned {
            return Err(ServiceError::Forbidden(
                "You cannot update this order item".to_string(),
            ));
        }

        if !item.fulfillment_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidOperation(
                "Cannot cancel an item that has been delivered".to_string(),
            ));
        }

        let order_id = item.order_id;
        let mut active: order_item::ActiveModel = item.into();
        active.fulfillment_status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        if let Some(order) = OrderEntity::find_by_id(order_id).one(&*self.db).await? {
            self.emit(Event::OrderItemStatusChanged {
                order_id,
                order_item_id: updated.id,
                buyer_id: order.buyer_id,
                new_status,
            })
            .await;
        }

        Ok(updated)
    }

    /// Bulk-applies a fulfillment status to every line the producer owns
    /// in the order; other producers' lines are untouched. Cancelling a
    /// previously paid order debits the producer's own line total and
    /// marks the order refunded.
    #[instrument(skip(self), fields(producer_id = %producer_id, order_id = %order_id))]
    pub async fn update_order_fulfillment_status(
        &self,
        producer_id: Uuid,
        order_id: Uuid,
        new_status: FulfillmentStatus,
    ) -> Result<OrderStatusUpdateResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
        let prev_payment = order.payment_status;

        let items = Self::producer_items(&txn, producer_id, order_id).await?;
        if items.is_empty() {
            return Err(ServiceError::Forbidden(
                "You cannot update this order".to_string(),
            ));
        }

        if new_status == FulfillmentStatus::Cancelled
            && items
                .iter()
                .any(|(item, _)| item.fulfillment_status == FulfillmentStatus::Delivered)
        {
            return Err(ServiceError::InvalidOperation(
                "Cannot cancel an order that has delivered items".to_string(),
            ));
        }

        let now = Utc::now();
        let mut updated_item_ids = Vec::with_capacity(items.len());
        for (item, _) in &items {
            let mut active: order_item::ActiveModel = item.clone().into();
            active.fulfillment_status = Set(new_status);
            active.updated_at = Set(Some(now));
            active.update(&txn).await?;
            updated_item_ids.push(item.id);
        }

        let mut payment_status = prev_payment;
        let mut debited = None;
        if new_status == FulfillmentStatus::Cancelled && prev_payment == PaymentStatus::Paid {
            let amount: Decimal = items
                .iter()
                .map(|(item, _)| item.unit_price * Decimal::from(item.quantity))
                .sum();
            let amount = amount.round_dp(2);
            if amount > Decimal::ZERO {
                WalletService::debit(
                    &txn,
                    producer_id,
                    amount,
                    &order.currency,
                    order_id,
                    format!("Refund for cancelled items of order {}", order_id),
                )
                .await?;
                debited = Some(amount);
            }

            let mut active: order::ActiveModel = order.clone().into();
            active.payment_status = Set(PaymentStatus::Refunded);
            active.updated_at = Set(Some(now));
            active.update(&txn).await?;
            payment_status = PaymentStatus::Refunded;
        }

        txn.commit().await?;

        self.emit(Event::OrderStatusBulkChanged {
            order_id,
            buyer_id: order.buyer_id,
            new_status,
            updated_item_ids: updated_item_ids.clone(),
        })
        .await;
        if let Some(amount) = debited {
            self.emit(Event::WalletDebited {
                producer_id,
                order_id,
                amount,
            })
            .await;
        }

        Ok(OrderStatusUpdateResponse {
            updated_item_ids,
            payment_status,
        })
    }

    /// Transitions an order's payment status. Producers may only touch COD
    /// orders containing their items; prepaid payment status is
    /// system-managed. The first genuine transition into `paid` posts one
    /// ledger credit per producer, proportional to their line totals;
    /// repeating the transition is a no-op for the ledger.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn update_payment_status(
        &self,
        actor: PaymentActor,
        order_id: Uuid,
        new_status: PaymentStatus,
    ) -> Result<PaymentStatus, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        if let PaymentActor::Producer(producer_id) = actor {
            if order.payment_method != PaymentMethod::Cod {
                return Err(ServiceError::InvalidOperation(
                    "Payment status can be manually updated only for COD orders".to_string(),
                ));
            }
            let owned = Self::producer_items(&txn, producer_id, order_id).await?;
            if owned.is_empty() {
                return Err(ServiceError::Forbidden(
                    "You cannot update payment status for this order".to_string(),
                ));
            }
        }

        let prev = order.payment_status;
        if !prev.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot change payment status from {} to {}",
                prev.as_str(),
                new_status.as_str()
            )));
        }

        if prev != new_status {
            let mut active: order::ActiveModel = order.clone().into();
            active.payment_status = Set(new_status);
            active.updated_at = Set(Some(Utc::now()));
            active.update(&txn).await?;
        }

        // First transition into `paid` is the sole trigger for crediting;
        // re-entering `paid` must not double-credit.
        let mut credits = Vec::new();
        if prev != PaymentStatus::Paid && new_status == PaymentStatus::Paid {
            let description = match actor {
                PaymentActor::Producer(_) => format!("Order {} COD payment credit", order_id),
                PaymentActor::Admin(_) => format!("Admin marked order {} paid", order_id),
            };
            let items = Self::items_with_products(&txn, order_id).await?;
            for (producer_id, amount) in Self::producer_totals(&items) {
                WalletService::credit(
                    &txn,
                    producer_id,
                    amount,
                    &order.currency,
                    order_id,
                    description.clone(),
                )
                .await?;
                credits.push((producer_id, amount));
            }
        }

        txn.commit().await?;

        self.emit(Event::OrderPaymentStatusChanged {
            order_id,
            old_status: prev,
            new_status,
        })
        .await;
        self.emit_credits(order_id, &credits).await;

        Ok(new_status)
    }

    /// All orders for a buyer, most recent first, with their lines.
    #[instrument(skip(self))]
    pub async fn list_buyer_orders(
        &self,
        buyer_id: Uuid,
    ) -> Result<Vec<BuyerOrderResponse>, ServiceError> {
        let orders = OrderEntity::find()
            .filter(order::Column::BuyerId.eq(buyer_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let items = if order_ids.is_empty() {
            Vec::new()
        } else {
            OrderItemEntity::find()
                .filter(order_item::Column::OrderId.is_in(order_ids))
                .find_also_related(ProductEntity)
                .all(&*self.db)
                .await?
        };

        let mut by_order: BTreeMap<Uuid, Vec<OrderLineResponse>> = BTreeMap::new();
        for (item, product) in items {
            let title = product.map(|p| p.title).unwrap_or_default();
            by_order
                .entry(item.order_id)
                .or_default()
                .push(OrderLineResponse {
                    item,
                    product_title: title,
                });
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = by_order.remove(&order.id).unwrap_or_default();
                BuyerOrderResponse { order, items }
            })
            .collect())
    }

    /// Paginated orders containing the producer's items, most recent
    /// first. Each entry carries only that producer's lines.
    #[instrument(skip(self))]
    pub async fn list_producer_orders(
        &self,
        producer_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<ProducerOrdersPage, ServiceError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let items = Self::all_producer_items(&*self.db, producer_id).await?;
        if items.is_empty() {
            return Ok(ProducerOrdersPage {
                items: Vec::new(),
                page,
                page_size: limit,
                total: 0,
                has_more: false,
            });
        }

        let mut order_ids: Vec<Uuid> = items.iter().map(|item| item.order_id).collect();
        order_ids.sort();
        order_ids.dedup();

        let paginator = OrderEntity::find()
            .filter(order::Column::Id.is_in(order_ids))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let mut by_order: BTreeMap<Uuid, Vec<order_item::Model>> = BTreeMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }

        let entries: Vec<ProducerOrderResponse> = orders
            .into_iter()
            .map(|order| ProducerOrderResponse {
                order_id: order.id,
                items: by_order.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect();

        let has_more = (page - 1) * limit + (entries.len() as u64) < total;
        Ok(ProducerOrdersPage {
            items: entries,
            page,
            page_size: limit,
            total,
            has_more,
        })
    }

    /// Aggregated order stats for a producer's dashboard. Each order is
    /// bucketed under the earliest stage among its non-cancelled items for
    /// this producer; revenue counts delivered orders only.
    #[instrument(skip(self))]
    pub async fn producer_order_stats(
        &self,
        producer_id: Uuid,
    ) -> Result<ProducerOrderStats, ServiceError> {
        let items = Self::all_producer_items(&*self.db, producer_id).await?;

        let mut by_order: BTreeMap<Uuid, Vec<order_item::Model>> = BTreeMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }

        let mut stats = ProducerOrderStats {
            total: 0,
            pending: 0,
            packed: 0,
            shipped: 0,
            delivered: 0,
            cancelled: 0,
            revenue: Decimal::ZERO,
        };

        for (_, items) in by_order {
            stats.total += 1;

            let active: Vec<&order_item::Model> = items
                .iter()
                .filter(|item| item.fulfillment_status != FulfillmentStatus::Cancelled)
                .collect();
            let considered: Vec<&order_item::Model> = if active.is_empty() {
                items.iter().collect()
            } else {
                active
            };

            let stage = considered
                .iter()
                .map(|item| item.fulfillment_status.stage())
                .min()
                .unwrap_or(0);

            match stage {
                0 => stats.pending += 1,
                1 => stats.packed += 1,
                2 => stats.shipped += 1,
                3 => {
                    stats.delivered += 1;
                    for item in &items {
                        stats.revenue += item.unit_price * Decimal::from(item.quantity);
                    }
                }
                _ => stats.cancelled += 1,
            }
        }

        Ok(stats)
    }

    // Internal helpers

    /// Resolves the buyer's cart into checkout lines inside the placement
    /// transaction. An empty cart aborts the checkout.
    async fn cart_checkout_lines(
        txn: &DatabaseTransaction,
        cart_id: Uuid,
    ) -> Result<Vec<CheckoutLine>, ServiceError> {
        let lines = CartService::lines_for_cart(txn, cart_id).await?;
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }
        Ok(lines
            .into_iter()
            .map(|(item, product)| CheckoutLine {
                product,
                quantity: item.quantity,
            })
            .collect())
    }

    async fn direct_checkout_lines(
        txn: &DatabaseTransaction,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Vec<CheckoutLine>, ServiceError> {
        let product = ProductEntity::find_by_id(product_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        Ok(vec![CheckoutLine { product, quantity }])
    }

    /// The shared atomic creation step: order row, one line per checkout
    /// line with its price snapshot, and a conditional stock decrement per
    /// product. Any failure rolls the whole unit back through the caller's
    /// transaction.
    #[allow(clippy::too_many_arguments)]
    async fn create_order_with_items(
        txn: &DatabaseTransaction,
        buyer_id: Uuid,
        address_id: Uuid,
        lines: &[CheckoutLine],
        payment_method: PaymentMethod,
        payment_status: PaymentStatus,
        currency: &str,
        provider_refs: Option<(&str, &str, &str)>,
    ) -> Result<order::Model, ServiceError> {
        let total: Decimal = lines
            .iter()
            .map(|line| line.product.price * Decimal::from(line.quantity))
            .sum();

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let (order_ref, payment_ref, signature) = match provider_refs {
            Some((o, p, s)) => (Some(o.to_string()), Some(p.to_string()), Some(s.to_string())),
            None => (None, None, None),
        };

        let order = order::ActiveModel {
            id: Set(order_id),
            buyer_id: Set(buyer_id),
            total_amount: Set(total.round_dp(2)),
            currency: Set(currency.to_string()),
            payment_method: Set(payment_method),
            payment_status: Set(payment_status),
            address_id: Set(address_id),
            provider_order_ref: Set(order_ref),
            provider_payment_ref: Set(payment_ref),
            provider_signature: Set(signature),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let order = match order.insert(txn).await {
            Ok(model) => model,
            Err(err) if ServiceError::is_unique_violation(&err) => {
                return Err(ServiceError::Conflict(
                    "This payment reference has already been used".to_string(),
                ));
            }
            Err(err) => return Err(err.into()),
        };

        for line in lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product.id),
                quantity: Set(line.quantity),
                unit_price: Set(line.product.price),
                fulfillment_status: Set(FulfillmentStatus::Pending),
                created_at: Set(now),
                updated_at: Set(Some(now)),
            };
            item.insert(txn).await?;

            StockGuard::reserve_and_decrement(txn, line.product.id, line.quantity).await?;
        }

        Ok(order)
    }

    /// Posts one credit per distinct producer in the order, proportional
    /// to that producer's line totals. Runs inside the placement
    /// transaction.
    async fn post_order_credits(
        txn: &DatabaseTransaction,
        order: &order::Model,
        lines: &[CheckoutLine],
        description_suffix: &str,
    ) -> Result<Vec<(Uuid, Decimal)>, ServiceError> {
        let mut totals: BTreeMap<Uuid, Decimal> = BTreeMap::new();
        for line in lines {
            let amount = line.product.price * Decimal::from(line.quantity);
            *totals.entry(line.product.producer_id).or_default() += amount;
        }

        let mut credits = Vec::with_capacity(totals.len());
        for (producer_id, amount) in totals {
            WalletService::credit(
                txn,
                producer_id,
                amount,
                &order.currency,
                order.id,
                format!("Order {} {}", order.id, description_suffix),
            )
            .await?;
            credits.push((producer_id, amount));
        }
        Ok(credits)
    }

    /// The producer's own lines in an order, resolved through product
    /// ownership.
    async fn producer_items<C: ConnectionTrait>(
        conn: &C,
        producer_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<(order_item::Model, product::Model)>, ServiceError> {
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .find_also_related(ProductEntity)
            .all(conn)
            .await?;

        Ok(items
            .into_iter()
            .filter_map(|(item, product)| {
                product
                    .filter(|p| p.producer_id == producer_id)
                    .map(|p| (item, p))
            })
            .collect())
    }

    /// Every line of a producer across all orders.
    async fn all_producer_items<C: ConnectionTrait>(
        conn: &C,
        producer_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        let product_ids: Vec<Uuid> = ProductEntity::find()
            .filter(product::Column::ProducerId.eq(producer_id))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::ProductId.is_in(product_ids))
            .all(conn)
            .await?;
        Ok(items)
    }

    async fn items_with_products<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
    ) -> Result<Vec<(order_item::Model, product::Model)>, ServiceError> {
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .find_also_related(ProductEntity)
            .all(conn)
            .await?;

        Ok(items
            .into_iter()
            .filter_map(|(item, product)| match product {
                Some(p) => Some((item, p)),
                None => {
                    warn!(order_item_id = %item.id, "Order item references a missing product; skipped for crediting");
                    None
                }
            })
            .collect())
    }

    /// Per-producer line totals for a set of order items.
    fn producer_totals(
        items: &[(order_item::Model, product::Model)],
    ) -> BTreeMap<Uuid, Decimal> {
        let mut totals: BTreeMap<Uuid, Decimal> = BTreeMap::new();
        for (item, product) in items {
            let amount = item.unit_price * Decimal::from(item.quantity);
            *totals.entry(product.producer_id).or_default() += amount;
        }
        totals
    }

    async fn emit_order_placed(&self, order: &order::Model, lines: &[CheckoutLine]) {
        let mut counts: BTreeMap<Uuid, u32> = BTreeMap::new();
        for line in lines {
            *counts.entry(line.product.producer_id).or_default() += 1;
        }
        self.emit(Event::OrderPlaced {
            order_id: order.id,
            buyer_id: order.buyer_id,
            producer_item_counts: counts.into_iter().collect(),
        })
        .await;
    }

    async fn emit_credits(&self, order_id: Uuid, credits: &[(Uuid, Decimal)]) {
        for (producer_id, amount) in credits {
            self.emit(Event::WalletCredited {
                producer_id: *producer_id,
                order_id,
                amount: *amount,
            })
            .await;
        }
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "Failed to send event");
        }
    }
}
