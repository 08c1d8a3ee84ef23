use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the services. Consumed by the background processor;
/// handlers never block on delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Checkout lifecycle
    CheckoutStarted {
        order_number: String,
        user_id: Uuid,
        final_amount: Decimal,
    },
    OrderPaid {
        order_number: String,
        paid_at: DateTime<Utc>,
    },
    PaymentFailed {
        order_number: String,
        reason: String,
    },

    // Order lifecycle
    OrderStatusChanged {
        order_number: String,
        old_status: String,
        new_status: String,
    },

    // Cart
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartItemUpdated { cart_id: Uuid, product_id: Uuid },
    CartItemRemoved { cart_id: Uuid, product_id: Uuid },

    // Vouchers
    VoucherReserved { code: String },
    VoucherRedeemed { code: String },
    VoucherReleased { code: String },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Event delivery is best-effort; request handling never depends on it.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

/// Background loop draining the event channel. Today events only feed the
/// structured log; order-confirmation email fan-out would hang off this loop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPaid {
                order_number,
                paid_at,
            } => {
                info!(order_number = %order_number, paid_at = %paid_at, "Order paid");
            }
            Event::PaymentFailed {
                order_number,
                reason,
            } => {
                warn!(order_number = %order_number, reason = %reason, "Payment failed");
            }
            Event::OrderStatusChanged {
                order_number,
                old_status,
                new_status,
            } => {
                info!(
                    order_number = %order_number,
                    from = %old_status,
                    to = %new_status,
                    "Order status changed"
                );
            }
            other => {
                info!("Event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let sender = EventSender::new(tx);
        // Must not panic or error out
        sender
            .send_or_log(Event::VoucherReleased {
                code: "SALE10".into(),
            })
            .await;
    }

    #[tokio::test]
    async fn events_round_trip_through_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::CartItemAdded {
                cart_id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
            })
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(Event::CartItemAdded { .. })
        ));
    }
}
