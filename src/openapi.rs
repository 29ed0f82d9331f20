use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use crate::AppState;

/// Aggregated OpenAPI document for the v1 API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "mandi-api",
        description = "Marketplace backend: carts, order lifecycle, payment verification and producer wallet ledger"
    ),
    paths(
        crate::handlers::orders::place_order,
        crate::handlers::orders::place_direct_order,
        crate::handlers::orders::verify_payment,
        crate::handlers::orders::verify_direct_payment,
        crate::handlers::orders::my_orders,
        crate::handlers::orders::producer_orders,
        crate::handlers::orders::producer_order_stats,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::update_order_item_status,
        crate::handlers::orders::update_payment_status,
        crate::handlers::orders::admin_update_payment_status,
        crate::handlers::payments::initiate_payment,
        crate::handlers::payments::initiate_direct_payment,
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::remove_item,
        crate::handlers::addresses::list_addresses,
        crate::handlers::addresses::create_address,
        crate::handlers::wallets::wallet_summary,
        crate::handlers::wallets::wallet_transactions,
        crate::handlers::wallets::platform_wallet,
        crate::handlers::push::register_buyer_token,
        crate::handlers::push::register_producer_token,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::order::PaymentMethod,
        crate::entities::order::PaymentStatus,
        crate::entities::order_item::FulfillmentStatus,
        crate::services::orders::PlaceOrderRequest,
        crate::services::orders::PlaceDirectOrderRequest,
        crate::services::orders::VerifyPaymentRequest,
        crate::services::orders::VerifyDirectPaymentRequest,
        crate::services::orders::OrderPlacedResponse,
        crate::services::orders::ProducerOrderStats,
        crate::services::orders::OrderStatusUpdateResponse,
        crate::services::payments::PaymentIntent,
        crate::services::wallets::WalletSummaryResponse,
        crate::services::addresses::CreateAddressRequest,
        crate::handlers::orders::UpdateFulfillmentStatusRequest,
        crate::handlers::orders::UpdatePaymentStatusRequest,
        crate::handlers::carts::AddCartItemRequest,
        crate::handlers::payments::InitiateDirectPaymentRequest,
        crate::handlers::push::RegisterPushTokenRequest,
    )),
    tags(
        (name = "Orders", description = "Checkout and order lifecycle"),
        (name = "Payments", description = "Payment intent initiation"),
        (name = "Carts", description = "Cart maintenance"),
        (name = "Addresses", description = "Buyer address book"),
        (name = "Wallet", description = "Producer wallet ledger"),
        (name = "Admin", description = "Platform administration"),
        (name = "Push", description = "Device token registration"),
    )
)]
pub struct ApiDoc;

/// Serves the raw OpenAPI document.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
