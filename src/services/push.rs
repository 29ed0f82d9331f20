use async_trait::async_trait;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::push_token::{self, Audience, Entity as PushTokenEntity},
    errors::ServiceError,
};

/// Collaborator boundary for push delivery: given device tokens and a
/// message, deliver best-effort. No delivery guarantee is required by the
/// core; failures are surfaced so callers can log them, never retried here.
#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn deliver(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<(), ServiceError>;
}

/// HTTP notifier posting an FCM-style payload to a configured endpoint.
pub struct HttpPushNotifier {
    client: reqwest::Client,
    endpoint: String,
    server_key: Option<String>,
}

impl HttpPushNotifier {
    pub fn new(endpoint: String, server_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            server_key,
        }
    }
}

#[async_trait]
impl PushNotifier for HttpPushNotifier {
    async fn deliver(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<(), ServiceError> {
        let payload = json!({
            "registration_ids": tokens,
            "notification": { "title": title, "body": body },
            "data": data,
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.server_key {
            request = request.header("authorization", format!("key={}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("push delivery: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "push endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Notifier stub that only logs; used when no push endpoint is configured
/// and in tests.
pub struct LogPushNotifier;

#[async_trait]
impl PushNotifier for LogPushNotifier {
    async fn deliver(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        _data: serde_json::Value,
    ) -> Result<(), ServiceError> {
        info!(recipients = tokens.len(), %title, %body, "Push notification (log only)");
        Ok(())
    }
}

/// Looks up registered device tokens and dispatches order notifications.
/// Everything here runs post-commit and is fire-and-forget from the
/// engine's point of view.
pub struct PushService {
    db: Arc<DbPool>,
    notifier: Arc<dyn PushNotifier>,
}

impl PushService {
    pub fn new(db: Arc<DbPool>, notifier: Arc<dyn PushNotifier>) -> Self {
        Self { db, notifier }
    }

    async fn tokens_for(
        &self,
        audience: Audience,
        owner_id: Uuid,
    ) -> Result<Vec<String>, ServiceError> {
        let rows = PushTokenEntity::find()
            .filter(push_token::Column::Audience.eq(audience))
            .filter(push_token::Column::OwnerId.eq(owner_id))
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(|r| r.token).collect())
    }

    /// Tells a producer that a new order containing their items arrived.
    pub async fn notify_producer_order_placed(
        &self,
        producer_id: Uuid,
        order_id: Uuid,
        items_count: u32,
    ) -> Result<(), ServiceError> {
        let tokens = self.tokens_for(Audience::Producer, producer_id).await?;
        if tokens.is_empty() {
            debug!(%producer_id, "No producer push tokens registered");
            return Ok(());
        }

        self.notifier
            .deliver(
                &tokens,
                "New order received",
                &format!("{} item(s) from order {}", items_count, order_id),
                json!({ "order_id": order_id, "items_count": items_count }),
            )
            .await
    }

    /// Tells a buyer that one of their orders progressed.
    pub async fn notify_buyer_order_status(
        &self,
        buyer_id: Uuid,
        order_id: Uuid,
        status: &str,
    ) -> Result<(), ServiceError> {
        let tokens = self.tokens_for(Audience::Buyer, buyer_id).await?;
        if tokens.is_empty() {
            debug!(%buyer_id, "No buyer push tokens registered");
            return Ok(());
        }

        self.notifier
            .deliver(
                &tokens,
                "Order update",
                &format!("Order {} is now {}", order_id, status),
                json!({ "order_id": order_id, "status": status }),
            )
            .await
    }
}
