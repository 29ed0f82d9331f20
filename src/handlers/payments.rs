use axum::{extract::State, response::IntoResponse, Json};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::BuyerIdentity,
    entities::product::Entity as ProductEntity,
    errors::ServiceError,
    services::{carts::CartService, inventory::StockGuard},
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct InitiateDirectPaymentRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// Create a provider payment intent for the buyer's cart total. The
/// stock check here is advisory; placement re-validates inside the
/// transaction.
#[utoipa::path(
    post,
    path = "/api/v1/payments/initiate",
    responses(
        (status = 200, description = "Payment intent created", body = crate::services::payments::PaymentIntent),
        (status = 400, description = "Cart empty", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    buyer: BuyerIdentity,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.get_or_create_cart(buyer.0).await?;
    let lines = CartService::lines_for_cart(&*state.db, cart.id).await?;
    if lines.is_empty() {
        return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
    }

    let mut total = Decimal::ZERO;
    for (item, product) in &lines {
        StockGuard::check_available(product, item.quantity)?;
        total += product.price * Decimal::from(item.quantity);
    }

    let intent = state
        .services
        .payment_provider
        .create_intent(total, &state.config.currency, &format!("cart_{}", cart.id))
        .await?;
    Ok(Json(ApiResponse::success(intent)))
}

/// Create a provider payment intent for a single product purchase.
#[utoipa::path(
    post,
    path = "/api/v1/payments/initiate-direct",
    request_body = InitiateDirectPaymentRequest,
    responses(
        (status = 200, description = "Payment intent created", body = crate::services::payments::PaymentIntent),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn initiate_direct_payment(
    State(state): State<AppState>,
    _buyer: BuyerIdentity,
    Json(request): Json<InitiateDirectPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    request.validate()?;

    let product = ProductEntity::find_by_id(request.product_id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Product {} not found", request.product_id))
        })?;

    StockGuard::check_available(&product, request.quantity)?;
    let total = product.price * Decimal::from(request.quantity);

    let intent = state
        .services
        .payment_provider
        .create_intent(
            total,
            &state.config.currency,
            &format!("direct_{}_{}", product.id, request.quantity),
        )
        .await?;
    Ok(Json(ApiResponse::success(intent)))
}
