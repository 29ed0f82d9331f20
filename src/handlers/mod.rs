pub mod addresses;
pub mod carts;
pub mod orders;
pub mod payments;
pub mod push;
pub mod wallets;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        addresses::AddressService,
        carts::CartService,
        orders::OrderService,
        payments::{LoggingPaymentProvider, PaymentProviderClient, PaymentVerifier},
        wallets::WalletService,
    },
    AppState,
};

/// Services layer used by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub carts: Arc<CartService>,
    pub wallets: Arc<WalletService>,
    pub addresses: Arc<AddressService>,
    pub payment_provider: Arc<dyn PaymentProviderClient>,
}

impl AppServices {
    /// Wires the service graph over a shared pool and event channel. The
    /// payment provider defaults to the local logging stub; production
    /// deployments swap in a real gateway client here.
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let addresses = Arc::new(AddressService::new(db.clone()));
        let carts = Arc::new(CartService::new(db.clone()));
        let wallets = Arc::new(WalletService::new(db.clone()));
        let verifier = PaymentVerifier::new(config.payment_key_secret.clone());
        let orders = Arc::new(OrderService::new(
            db,
            event_sender,
            verifier,
            addresses.clone(),
            carts.clone(),
            config.currency.clone(),
        ));
        let payment_provider: Arc<dyn PaymentProviderClient> =
            Arc::new(LoggingPaymentProvider::new(config.payment_key_id.clone()));

        Self {
            orders,
            carts,
            wallets,
            addresses,
            payment_provider,
        }
    }
}

/// Full v1 API surface.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Buyer: checkout and orders
        .route("/orders/place", post(orders::place_order))
        .route("/orders/direct", post(orders::place_direct_order))
        .route("/orders/verify", post(orders::verify_payment))
        .route("/orders/verify-direct", post(orders::verify_direct_payment))
        .route("/orders/my", get(orders::my_orders))
        // Producer: order views and transitions
        .route("/orders/producer", get(orders::producer_orders))
        .route("/orders/producer/stats", get(orders::producer_order_stats))
        .route("/orders/:id/status", patch(orders::update_order_status))
        .route(
            "/orders/items/:id/status",
            patch(orders::update_order_item_status),
        )
        .route(
            "/orders/:id/payment-status",
            patch(orders::update_payment_status),
        )
        // Admin overrides
        .route(
            "/admin/orders/:id/payment-status",
            patch(orders::admin_update_payment_status),
        )
        .route("/admin/wallet", get(wallets::platform_wallet))
        // Payments: intent initiation for prepaid flows
        .route("/payments/initiate", post(payments::initiate_payment))
        .route(
            "/payments/initiate-direct",
            post(payments::initiate_direct_payment),
        )
        // Carts
        .route("/carts", get(carts::get_cart))
        .route("/carts/items", post(carts::add_item))
        .route("/carts/items/:product_id", axum::routing::delete(carts::remove_item))
        // Addresses
        .route(
            "/addresses",
            get(addresses::list_addresses).post(addresses::create_address),
        )
        // Producer wallet
        .route("/wallet", get(wallets::wallet_summary))
        .route("/wallet/transactions", get(wallets::wallet_transactions))
        // Push token registration
        .route("/push/tokens", post(push::register_buyer_token))
        .route("/producer/push/tokens", post(push::register_producer_token))
}
