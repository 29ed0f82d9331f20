//! Integration tests for the prepaid verification path: signature
//! checking, atomic order creation with in-transaction crediting, stock
//! re-validation and payment-reference idempotency.

mod common;

use common::TestApp;
use mandi_api::entities::order::{PaymentMethod, PaymentStatus};
use mandi_api::errors::ServiceError;
use mandi_api::services::orders::{VerifyDirectPaymentRequest, VerifyPaymentRequest};
use mandi_api::services::payments::PaymentVerifier;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

fn signed(order_ref: &str, payment_ref: &str) -> String {
    PaymentVerifier::new(common::PAYMENT_SECRET).expected_signature(order_ref, payment_ref)
}

#[tokio::test]
async fn verified_cart_payment_places_order_and_credits_in_one_unit() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let producer_a = Uuid::new_v4();
    let producer_b = Uuid::new_v4();
    let address = app.seed_address(buyer).await;
    let milk = app.seed_product(producer_a, "Milk", dec!(60.00), 10).await;
    let eggs = app.seed_product(producer_b, "Eggs", dec!(8.00), 30).await;

    app.state
        .services
        .carts
        .add_item(buyer, milk.id, 2, false)
        .await
        .unwrap();
    app.state
        .services
        .carts
        .add_item(buyer, eggs.id, 12, false)
        .await
        .unwrap();

    let placed = app
        .state
        .services
        .orders
        .verify_and_place_prepaid_order(
            buyer,
            VerifyPaymentRequest {
                address_id: address.id,
                provider_order_ref: "order_cart1".to_string(),
                provider_payment_ref: "pay_cart1".to_string(),
                provider_signature: signed("order_cart1", "pay_cart1"),
            },
        )
        .await
        .unwrap();
    assert_eq!(placed.payment_status, PaymentStatus::Paid);

    let order = app.order(placed.order_id).await;
    assert_eq!(order.payment_method, PaymentMethod::Prepaid);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.total_amount, dec!(216.00));
    assert_eq!(order.provider_order_ref.as_deref(), Some("order_cart1"));
    assert_eq!(order.provider_payment_ref.as_deref(), Some("pay_cart1"));

    // Stock moved and the cart converted
    assert_eq!(app.product(milk.id).await.inventory, 8);
    assert_eq!(app.product(eggs.id).await.inventory, 18);
    assert!(app
        .state
        .services
        .carts
        .get_cart(buyer)
        .await
        .unwrap()
        .items
        .is_empty());

    // Ledger credits across producers equal the order total, mirrored on
    // the platform wallet
    assert_eq!(
        app.producer_wallet(producer_a).await.unwrap().balance,
        dec!(120.00)
    );
    assert_eq!(
        app.producer_wallet(producer_b).await.unwrap().balance,
        dec!(96.00)
    );
    assert_eq!(app.admin_wallet().await.unwrap().balance, dec!(216.00));
    assert_eq!(app.wallet_transactions(producer_a).await.len(), 1);
    assert_eq!(app.wallet_transactions(producer_b).await.len(), 1);
}

#[tokio::test]
async fn bad_signature_creates_nothing() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let producer = Uuid::new_v4();
    let address = app.seed_address(buyer).await;
    let product = app.seed_product(producer, "Butter", dec!(220.00), 5).await;

    app.state
        .services
        .carts
        .add_item(buyer, product.id, 1, false)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .orders
        .verify_and_place_prepaid_order(
            buyer,
            VerifyPaymentRequest {
                address_id: address.id,
                provider_order_ref: "order_bad".to_string(),
                provider_payment_ref: "pay_bad".to_string(),
                provider_signature: "deadbeef".repeat(8),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PaymentFailed(_)));

    assert!(mandi_api::entities::Order::find()
        .all(&*app.state.db)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(app.product(product.id).await.inventory, 5);
    assert!(app.producer_wallet(producer).await.is_none());
}

#[tokio::test]
async fn duplicate_payment_reference_cannot_create_two_orders() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let producer = Uuid::new_v4();
    let address = app.seed_address(buyer).await;
    let product = app.seed_product(producer, "Dates", dec!(300.00), 10).await;

    let request = |address_id| VerifyDirectPaymentRequest {
        product_id: product.id,
        quantity: 1,
        address_id,
        provider_order_ref: "order_dup".to_string(),
        provider_payment_ref: "pay_dup".to_string(),
        provider_signature: signed("order_dup", "pay_dup"),
    };

    app.state
        .services
        .orders
        .verify_and_place_direct_prepaid_order(buyer, request(address.id))
        .await
        .unwrap();

    let err = app
        .state
        .services
        .orders
        .verify_and_place_direct_prepaid_order(buyer, request(address.id))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    // Exactly one order, one decrement, one credit
    assert_eq!(
        mandi_api::entities::Order::find()
            .all(&*app.state.db)
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(app.product(product.id).await.inventory, 9);
    assert_eq!(app.wallet_transactions(producer).await.len(), 1);
    assert_eq!(
        app.producer_wallet(producer).await.unwrap().balance,
        dec!(300.00)
    );
}

#[tokio::test]
async fn stock_is_revalidated_at_verification_time() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let producer = Uuid::new_v4();
    let address = app.seed_address(buyer).await;
    let product = app.seed_product(producer, "Peaches", dec!(180.00), 2).await;

    app.state
        .services
        .carts
        .add_item(buyer, product.id, 2, false)
        .await
        .unwrap();

    // Stock drains between intent creation and verification
    use sea_orm::{ActiveModelTrait, Set};
    let mut active: mandi_api::entities::product::ActiveModel =
        app.product(product.id).await.into();
    active.inventory = Set(1);
    active.update(&*app.state.db).await.unwrap();

    let err = app
        .state
        .services
        .orders
        .verify_and_place_prepaid_order(
            buyer,
            VerifyPaymentRequest {
                address_id: address.id,
                provider_order_ref: "order_stale".to_string(),
                provider_payment_ref: "pay_stale".to_string(),
                provider_signature: signed("order_stale", "pay_stale"),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    // Rolled back wholesale: no order, no credit, stock untouched
    assert!(mandi_api::entities::Order::find()
        .all(&*app.state.db)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(app.product(product.id).await.inventory, 1);
    assert!(app.producer_wallet(producer).await.is_none());

    // The cart is preserved so the buyer can retry
    assert_eq!(
        app.state
            .services
            .carts
            .get_cart(buyer)
            .await
            .unwrap()
            .items
            .len(),
        1
    );
}

#[tokio::test]
async fn verification_checks_address_ownership() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let other_buyer = Uuid::new_v4();
    let producer = Uuid::new_v4();
    let foreign_address = app.seed_address(other_buyer).await;
    let product = app.seed_product(producer, "Almonds", dec!(700.00), 4).await;

    let err = app
        .state
        .services
        .orders
        .verify_and_place_direct_prepaid_order(
            buyer,
            VerifyDirectPaymentRequest {
                product_id: product.id,
                quantity: 1,
                address_id: foreign_address.id,
                provider_order_ref: "order_addr".to_string(),
                provider_payment_ref: "pay_addr".to_string(),
                provider_signature: signed("order_addr", "pay_addr"),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
    assert!(mandi_api::entities::Order::find()
        .all(&*app.state.db)
        .await
        .unwrap()
        .is_empty());
}
