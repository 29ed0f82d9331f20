#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use mandi_api::{
    auth::{issue_token, Actor},
    config::AppConfig,
    db,
    entities::{
        address, admin_wallet, order, order_item, producer_wallet, product, wallet_transaction,
    },
    events::{self, EventSender},
    handlers::AppServices,
    AppState,
};

pub const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const PAYMENT_SECRET: &str = "test_payment_secret_key";

/// Test harness spinning up application state over a throwaway SQLite
/// database. The pool is capped at one connection so concurrent checkout
/// attempts serialize at the storage layer exactly like row locks would.
pub struct TestApp {
    pub state: AppState,
    router: Router,
    _event_task: tokio::task::JoinHandle<()>,
    _tmp: tempfile::TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let tmp = tempfile::tempdir().expect("create temp dir for test database");
        let db_path = tmp.path().join("mandi_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            JWT_SECRET.to_string(),
            PAYMENT_SECRET.to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx, None));

        let services = AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()), &cfg);

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", mandi_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            state,
            router,
            _event_task: event_task,
            _tmp: tmp,
        }
    }

    pub fn token_for(&self, actor: Actor, subject: Uuid) -> String {
        issue_token(
            &self.state.config.jwt_secret,
            actor,
            subject,
            Duration::hours(1),
        )
        .expect("issue test token")
    }

    /// Send a request against the router with an optional bearer token.
    #[allow(dead_code)]
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_product(
        &self,
        producer_id: Uuid,
        title: &str,
        price: Decimal,
        inventory: i32,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            producer_id: Set(producer_id),
            title: Set(title.to_string()),
            description: Set(Some(format!("{} from the test farm", title))),
            price: Set(price),
            inventory: Set(inventory),
            unit_label: Set("kg".to_string()),
            unit_size: Set(1.0),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_address(&self, buyer_id: Uuid) -> address::Model {
        let now = Utc::now();
        address::ActiveModel {
            id: Set(Uuid::new_v4()),
            buyer_id: Set(buyer_id),
            label: Set(Some("Home".to_string())),
            contact_name: Set("Test Buyer".to_string()),
            contact_phone: Set("9900112233".to_string()),
            address_line1: Set("12 Market Road".to_string()),
            address_line2: Set(None),
            city: Set("Pune".to_string()),
            state: Set("MH".to_string()),
            postal_code: Set("411001".to_string()),
            country: Set("India".to_string()),
            is_default: Set(true),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed address")
    }

    pub async fn product(&self, product_id: Uuid) -> product::Model {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
    }

    pub async fn order(&self, order_id: Uuid) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("query order")
            .expect("order exists")
    }

    pub async fn order_items(&self, order_id: Uuid) -> Vec<order_item::Model> {
        order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.state.db)
            .await
            .expect("query order items")
    }

    #[allow(dead_code)]
    pub async fn producer_wallet(&self, producer_id: Uuid) -> Option<producer_wallet::Model> {
        producer_wallet::Entity::find()
            .filter(producer_wallet::Column::ProducerId.eq(producer_id))
            .one(&*self.state.db)
            .await
            .expect("query producer wallet")
    }

    #[allow(dead_code)]
    pub async fn admin_wallet(&self) -> Option<admin_wallet::Model> {
        admin_wallet::Entity::find_by_id(admin_wallet::SINGLETON_ID)
            .one(&*self.state.db)
            .await
            .expect("query admin wallet")
    }

    #[allow(dead_code)]
    pub async fn wallet_transactions(&self, producer_id: Uuid) -> Vec<wallet_transaction::Model> {
        wallet_transaction::Entity::find()
            .filter(wallet_transaction::Column::ProducerId.eq(producer_id))
            .all(&*self.state.db)
            .await
            .expect("query wallet transactions")
    }
}
