//! Integration tests for order placement and fulfillment transitions:
//! price snapshots, atomic stock decrements, all-or-nothing aborts, the
//! stock race, and the delivered-item terminal guard.

mod common;

use common::TestApp;
use mandi_api::entities::order::{PaymentMethod, PaymentStatus};
use mandi_api::entities::order_item::FulfillmentStatus;
use mandi_api::errors::ServiceError;
use mandi_api::services::orders::{PlaceDirectOrderRequest, PlaceOrderRequest};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

#[tokio::test]
async fn cod_cart_placement_snapshots_prices_and_decrements_stock() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let producer = Uuid::new_v4();
    let address = app.seed_address(buyer).await;
    let tomatoes = app.seed_product(producer, "Tomatoes", dec!(100.00), 10).await;

    app.state
        .services
        .carts
        .add_item(buyer, tomatoes.id, 2, false)
        .await
        .expect("add to cart");

    let placed = app
        .state
        .services
        .orders
        .place_order(
            buyer,
            PlaceOrderRequest {
                address_id: address.id,
                payment_method: PaymentMethod::Cod,
            },
        )
        .await
        .expect("place COD order");

    let order = app.order(placed.order_id).await;
    assert_eq!(order.total_amount, dec!(200.00));
    assert_eq!(order.payment_method, PaymentMethod::Cod);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.currency, "INR");
    assert!(order.provider_payment_ref.is_none());

    let items = app.order_items(order.id).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].unit_price, dec!(100.00));
    assert_eq!(items[0].fulfillment_status, FulfillmentStatus::Pending);

    // Inventory decreased by exactly the ordered quantity
    assert_eq!(app.product(tomatoes.id).await.inventory, 8);

    // No ledger postings before the order is paid
    assert!(app.producer_wallet(producer).await.is_none());
    assert!(app.wallet_transactions(producer).await.is_empty());
    assert!(app.admin_wallet().await.is_none());

    // Cart was cleared inside the placement transaction
    let cart = app.state.services.carts.get_cart(buyer).await.unwrap();
    assert!(cart.items.is_empty());
}

#[tokio::test]
async fn price_snapshot_survives_later_price_changes() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let producer = Uuid::new_v4();
    let address = app.seed_address(buyer).await;
    let product = app.seed_product(producer, "Honey", dec!(250.00), 5).await;

    let placed = app
        .state
        .services
        .orders
        .place_direct_order(
            buyer,
            PlaceDirectOrderRequest {
                product_id: product.id,
                quantity: 1,
                address_id: address.id,
                payment_method: PaymentMethod::Cod,
            },
        )
        .await
        .expect("place direct order");

    // Reprice the product after the order exists
    use sea_orm::{ActiveModelTrait, Set};
    let mut active: mandi_api::entities::product::ActiveModel =
        app.product(product.id).await.into();
    active.price = Set(dec!(999.00));
    active.update(&*app.state.db).await.unwrap();

    let items = app.order_items(placed.order_id).await;
    assert_eq!(items[0].unit_price, dec!(250.00));
    assert_eq!(app.order(placed.order_id).await.total_amount, dec!(250.00));
}

#[tokio::test]
async fn prepaid_is_rejected_on_the_direct_placement_path() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let producer = Uuid::new_v4();
    let address = app.seed_address(buyer).await;
    let product = app.seed_product(producer, "Paneer", dec!(80.00), 4).await;

    let err = app
        .state
        .services
        .orders
        .place_direct_order(
            buyer,
            PlaceDirectOrderRequest {
                product_id: product.id,
                quantity: 1,
                address_id: address.id,
                payment_method: PaymentMethod::Prepaid,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InvalidOperation(_)));
    assert_eq!(app.product(product.id).await.inventory, 4);
    assert!(mandi_api::entities::Order::find()
        .all(&*app.state.db)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn address_must_belong_to_the_buyer() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let other_buyer = Uuid::new_v4();
    let producer = Uuid::new_v4();
    let foreign_address = app.seed_address(other_buyer).await;
    let product = app.seed_product(producer, "Ghee", dec!(400.00), 3).await;

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
        .place_order(
            buyer,
            PlaceOrderRequest {
                address_id: foreign_address.id,
                payment_method: PaymentMethod::Cod,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InvalidInput(_)));
    assert_eq!(app.product(product.id).await.inventory, 3);
}

#[tokio::test]
async fn empty_cart_cannot_be_checked_out() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer).await;

    let err = app
        .state
        .services
        .orders
        .place_order(
            buyer,
            PlaceOrderRequest {
                address_id: address.id,
                payment_method: PaymentMethod::Cod,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn one_short_line_aborts_the_whole_order() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let producer = Uuid::new_v4();
    let address = app.seed_address(buyer).await;
    let plenty = app.seed_product(producer, "Potatoes", dec!(30.00), 50).await;
    let scarce = app.seed_product(producer, "Saffron", dec!(500.00), 2).await;

    app.state
        .services
        .carts
        .add_item(buyer, plenty.id, 5, false)
        .await
        .unwrap();
    app.state
        .services
        .carts
        .add_item(buyer, scarce.id, 3, false)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .orders
        .place_order(
            buyer,
            PlaceOrderRequest {
                address_id: address.id,
                payment_method: PaymentMethod::Cod,
            },
        )
        .await
        .unwrap_err();

    match err {
        ServiceError::InsufficientStock(msg) => {
            assert!(msg.contains("Saffron"), "error names the offending product");
            assert!(msg.contains("Available: 2"));
            assert!(msg.contains("Required: 3"));
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // All-or-nothing: nothing committed, no stock moved, cart intact
    assert!(mandi_api::entities::Order::find()
        .all(&*app.state.db)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(app.product(plenty.id).await.inventory, 50);
    assert_eq!(app.product(scarce.id).await.inventory, 2);
    let cart = app.state.services.carts.get_cart(buyer).await.unwrap();
    assert_eq!(cart.items.len(), 2);
}

#[tokio::test]
async fn concurrent_checkouts_for_the_last_unit_produce_one_winner() {
    let app = TestApp::new().await;
    let producer = Uuid::new_v4();
    let product = app.seed_product(producer, "Mangoes", dec!(150.00), 1).await;

    let buyer_a = Uuid::new_v4();
    let buyer_b = Uuid::new_v4();
    let address_a = app.seed_address(buyer_a).await;
    let address_b = app.seed_address(buyer_b).await;

    let orders = &app.state.services.orders;
    let (first, second) = tokio::join!(
        orders.place_direct_order(
            buyer_a,
            PlaceDirectOrderRequest {
                product_id: product.id,
                quantity: 1,
                address_id: address_a.id,
                payment_method: PaymentMethod::Cod,
            },
        ),
        orders.place_direct_order(
            buyer_b,
            PlaceDirectOrderRequest {
                product_id: product.id,
                quantity: 1,
                address_id: address_b.id,
                payment_method: PaymentMethod::Cod,
            },
        ),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one checkout wins the last unit");

    let failure = if first.is_err() { first } else { second };
    assert!(matches!(
        failure.unwrap_err(),
        ServiceError::InsufficientStock(_)
    ));

    assert_eq!(app.product(product.id).await.inventory, 0);
    assert_eq!(
        mandi_api::entities::Order::find()
            .all(&*app.state.db)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn delivered_item_cannot_be_cancelled_by_any_path() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let producer = Uuid::new_v4();
    let address = app.seed_address(buyer).await;
    let product = app.seed_product(producer, "Apples", dec!(120.00), 10).await;

    let placed = app
        .state
        .services
        .orders
        .place_direct_order(
            buyer,
            PlaceDirectOrderRequest {
                product_id: product.id,
                quantity: 1,
                address_id: address.id,
                payment_method: PaymentMethod::Cod,
            },
        )
        .await
        .unwrap();
    let item_id = app.order_items(placed.order_id).await[0].id;

    app.state
        .services
        .orders
        .update_item_fulfillment_status(producer, item_id, FulfillmentStatus::Delivered)
        .await
        .expect("mark delivered");

    // Item-level cancel is rejected
    let err = app
        .state
        .services
        .orders
        .update_item_fulfillment_status(producer, item_id, FulfillmentStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));

    // Order-level cancel is rejected too
    let err = app
        .state
        .services
        .orders
        .update_order_fulfillment_status(producer, placed.order_id, FulfillmentStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));

    let items = app.order_items(placed.order_id).await;
    assert_eq!(items[0].fulfillment_status, FulfillmentStatus::Delivered);
}

#[tokio::test]
async fn only_the_owning_producer_may_update_an_item() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let producer = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let address = app.seed_address(buyer).await;
    let product = app.seed_product(producer, "Bananas", dec!(40.00), 12).await;

    let placed = app
        .state
        .services
        .orders
        .place_direct_order(
            buyer,
            PlaceDirectOrderRequest {
                product_id: product.id,
                quantity: 2,
                address_id: address.id,
                payment_method: PaymentMethod::Cod,
            },
        )
        .await
        .unwrap();
    let item_id = app.order_items(placed.order_id).await[0].id;

    let err = app
        .state
        .services
        .orders
        .update_item_fulfillment_status(stranger, item_id, FulfillmentStatus::Packed)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let err = app
        .state
        .services
        .orders
        .update_order_fulfillment_status(stranger, placed.order_id, FulfillmentStatus::Packed)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn bulk_status_update_leaves_other_producers_items_alone() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let producer_a = Uuid::new_v4();
    let producer_b = Uuid::new_v4();
    let address = app.seed_address(buyer).await;
    let from_a = app.seed_product(producer_a, "Spinach", dec!(25.00), 20).await;
    let from_b = app.seed_product(producer_b, "Carrots", dec!(35.00), 20).await;

    app.state
        .services
        .carts
        .add_item(buyer, from_a.id, 1, false)
        .await
        .unwrap();
    app.state
        .services
        .carts
        .add_item(buyer, from_b.id, 1, false)
        .await
        .unwrap();

    let placed = app
        .state
        .services
        .orders
        .place_order(
            buyer,
            PlaceOrderRequest {
                address_id: address.id,
                payment_method: PaymentMethod::Cod,
            },
        )
        .await
        .unwrap();

    let response = app
        .state
        .services
        .orders
        .update_order_fulfillment_status(producer_a, placed.order_id, FulfillmentStatus::Shipped)
        .await
        .unwrap();
    assert_eq!(response.updated_item_ids.len(), 1);

    for item in app.order_items(placed.order_id).await {
        if item.product_id == from_a.id {
            assert_eq!(item.fulfillment_status, FulfillmentStatus::Shipped);
        } else {
            assert_eq!(item.fulfillment_status, FulfillmentStatus::Pending);
        }
    }
}

#[tokio::test]
async fn buyer_and_producer_order_views() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let producer = Uuid::new_v4();
    let address = app.seed_address(buyer).await;
    let product = app.seed_product(producer, "Wheat", dec!(32.00), 100).await;

    for quantity in [1, 2] {
        app.state
            .services
            .orders
            .place_direct_order(
                buyer,
                PlaceDirectOrderRequest {
                    product_id: product.id,
                    quantity,
                    address_id: address.id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();
    }

    let buyer_orders = app
        .state
        .services
        .orders
        .list_buyer_orders(buyer)
        .await
        .unwrap();
    assert_eq!(buyer_orders.len(), 2);
    assert_eq!(buyer_orders[0].items.len(), 1);
    assert_eq!(buyer_orders[0].items[0].product_title, "Wheat");

    let page = app
        .state
        .services
        .orders
        .list_producer_orders(producer, 1, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert!(!page.has_more);
    assert!(page.items.iter().all(|entry| entry.items.len() == 1));

    let stats = app
        .state
        .services
        .orders
        .producer_order_stats(producer)
        .await
        .unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.revenue, dec!(0.00));
}
