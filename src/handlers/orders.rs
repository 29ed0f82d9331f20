use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{AdminIdentity, BuyerIdentity, ProducerIdentity},
    entities::{order::PaymentStatus, order_item::FulfillmentStatus},
    errors::ServiceError,
    services::orders::{
        PaymentActor, PlaceDirectOrderRequest, PlaceOrderRequest, VerifyDirectPaymentRequest,
        VerifyPaymentRequest,
    },
    ApiResponse, AppState, ListQuery,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateFulfillmentStatusRequest {
    pub status: FulfillmentStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: PaymentStatus,
}

/// Place a COD order from the buyer's cart.
#[utoipa::path(
    post,
    path = "/api/v1/orders/place",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order placed"),
        (status = 400, description = "Validation failure", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    buyer: BuyerIdentity,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state.services.orders.place_order(buyer.0, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Place a COD order for a single product ("buy now").
#[utoipa::path(
    post,
    path = "/api/v1/orders/direct",
    request_body = PlaceDirectOrderRequest,
    responses(
        (status = 201, description = "Order placed"),
        (status = 400, description = "Validation failure", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn place_direct_order(
    State(state): State<AppState>,
    buyer: BuyerIdentity,
    Json(request): Json<PlaceDirectOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state
        .services
        .orders
        .place_direct_order(buyer.0, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Verify a provider payment and place the prepaid order from the cart.
#[utoipa::path(
    post,
    path = "/api/v1/orders/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified and order placed"),
        (status = 402, description = "Signature verification failed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Payment reference already used", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    buyer: BuyerIdentity,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state
        .services
        .orders
        .verify_and_place_prepaid_order(buyer.0, request)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Verify a provider payment and place a direct prepaid order.
#[utoipa::path(
    post,
    path = "/api/v1/orders/verify-direct",
    request_body = VerifyDirectPaymentRequest,
    responses(
        (status = 200, description = "Payment verified and order placed"),
        (status = 402, description = "Signature verification failed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Payment reference already used", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn verify_direct_payment(
    State(state): State<AppState>,
    buyer: BuyerIdentity,
    Json(request): Json<VerifyDirectPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state
        .services
        .orders
        .verify_and_place_direct_prepaid_order(buyer.0, request)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// All orders for the current buyer, most recent first.
#[utoipa::path(
    get,
    path = "/api/v1/orders/my",
    responses((status = 200, description = "Buyer orders")),
    tag = "Orders"
)]
pub async fn my_orders(
    State(state): State<AppState>,
    buyer: BuyerIdentity,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.orders.list_buyer_orders(buyer.0).await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Paginated orders containing the current producer's items.
#[utoipa::path(
    get,
    path = "/api/v1/orders/producer",
    params(("page" = u64, Query, description = "Page number"), ("limit" = u64, Query, description = "Page size")),
    responses((status = 200, description = "Producer orders")),
    tag = "Orders"
)]
pub async fn producer_orders(
    State(state): State<AppState>,
    producer: ProducerIdentity,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state
        .services
        .orders
        .list_producer_orders(producer.0, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Aggregated order stats for the current producer.
#[utoipa::path(
    get,
    path = "/api/v1/orders/producer/stats",
    responses((status = 200, description = "Producer order stats")),
    tag = "Orders"
)]
pub async fn producer_order_stats(
    State(state): State<AppState>,
    producer: ProducerIdentity,
) -> Result<impl IntoResponse, ServiceError> {
    let stats = state
        .services
        .orders
        .producer_order_stats(producer.0)
        .await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// Bulk-apply a fulfillment status to the producer's items in an order.
#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateFulfillmentStatusRequest,
    responses(
        (status = 200, description = "Status updated"),
        (status = 400, description = "Invalid transition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the producer's order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    producer: ProducerIdentity,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateFulfillmentStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state
        .services
        .orders
        .update_order_fulfillment_status(producer.0, order_id, request.status)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Update a single order item's fulfillment status.
#[utoipa::path(
    patch,
    path = "/api/v1/orders/items/{id}/status",
    params(("id" = Uuid, Path, description = "Order item id")),
    request_body = UpdateFulfillmentStatusRequest,
    responses(
        (status = 200, description = "Item status updated"),
        (status = 400, description = "Invalid transition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the producer's item", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_item_status(
    State(state): State<AppState>,
    producer: ProducerIdentity,
    Path(order_item_id): Path<Uuid>,
    Json(request): Json<UpdateFulfillmentStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state
        .services
        .orders
        .update_item_fulfillment_status(producer.0, order_item_id, request.status)
        .await?;
    Ok(Json(ApiResponse::success(item)))
}

/// Update payment status for a COD order containing the producer's items.
#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/payment-status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdatePaymentStatusRequest,
    responses(
        (status = 200, description = "Payment status updated"),
        (status = 400, description = "Invalid transition or non-COD order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_payment_status(
    State(state): State<AppState>,
    producer: ProducerIdentity,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdatePaymentStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = state
        .services
        .orders
        .update_payment_status(
            PaymentActor::Producer(producer.0),
            order_id,
            request.payment_status,
        )
        .await?;
    Ok(Json(ApiResponse::success(status)))
}

/// Admin override for any order's payment status.
#[utoipa::path(
    patch,
    path = "/api/v1/admin/orders/{id}/payment-status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdatePaymentStatusRequest,
    responses(
        (status = 200, description = "Payment status updated"),
        (status = 400, description = "Invalid transition", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn admin_update_payment_status(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdatePaymentStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = state
        .services
        .orders
        .update_payment_status(
            PaymentActor::Admin(admin.0),
            order_id,
            request.payment_status,
        )
        .await?;
    Ok(Json(ApiResponse::success(status)))
}
