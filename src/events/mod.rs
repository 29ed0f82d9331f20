use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::PaymentStatus;
use crate::entities::order_item::FulfillmentStatus;
use crate::services::push::PushService;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. Event delivery is best-effort; a
    /// full or closed channel is reported to the caller as a plain error
    /// string so it can be logged and swallowed.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Domain events emitted after a unit of work commits. Consumers must
/// never influence the already-committed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// An order was placed; carries one entry per distinct producer with
    /// that producer's item count, for fan-out notification.
    OrderPlaced {
        order_id: Uuid,
        buyer_id: Uuid,
        producer_item_counts: Vec<(Uuid, u32)>,
    },
    OrderItemStatusChanged {
        order_id: Uuid,
        order_item_id: Uuid,
        buyer_id: Uuid,
        new_status: FulfillmentStatus,
    },
    OrderStatusBulkChanged {
        order_id: Uuid,
        buyer_id: Uuid,
        new_status: FulfillmentStatus,
        updated_item_ids: Vec<Uuid>,
    },
    OrderPaymentStatusChanged {
        order_id: Uuid,
        old_status: PaymentStatus,
        new_status: PaymentStatus,
    },
    WalletCredited {
        producer_id: Uuid,
        order_id: Uuid,
        amount: Decimal,
    },
    WalletDebited {
        producer_id: Uuid,
        order_id: Uuid,
        amount: Decimal,
    },
    CartCleared(Uuid),
}

/// Processes incoming events: logs every event and fans order/fulfillment
/// events out to push notifications when a notifier is configured.
/// Failures here are logged and dropped; committed state is never touched.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, push: Option<Arc<PushService>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!(?event, "Received event");

        let Some(push) = push.as_ref() else {
            continue;
        };

        match event {
            Event::OrderPlaced {
                order_id,
                producer_item_counts,
                ..
            } => {
                for (producer_id, items_count) in producer_item_counts {
                    if let Err(e) = push
                        .notify_producer_order_placed(producer_id, order_id, items_count)
                        .await
                    {
                        warn!(%order_id, %producer_id, error = %e, "Order placed notification failed");
                    }
                }
            }
            Event::OrderItemStatusChanged {
                order_id,
                buyer_id,
                new_status,
                ..
            } => {
                if let Err(e) = push
                    .notify_buyer_order_status(buyer_id, order_id, new_status.as_str())
                    .await
                {
                    warn!(%order_id, %buyer_id, error = %e, "Order status notification failed");
                }
            }
            Event::OrderStatusBulkChanged {
                order_id,
                buyer_id,
                new_status,
                ..
            } => {
                if let Err(e) = push
                    .notify_buyer_order_status(buyer_id, order_id, new_status.as_str())
                    .await
                {
                    warn!(%order_id, %buyer_id, error = %e, "Order status notification failed");
                }
            }
            _ => {}
        }
    }

    info!("Event processing loop stopped");
}
