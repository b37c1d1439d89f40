use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Events emitted at every externally observable checkout transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartItemAdded {
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartItemUpdated {
        user_id: Uuid,
        line_id: Uuid,
        quantity: i32,
    },
    CartItemRemoved {
        user_id: Uuid,
        line_id: Uuid,
    },
    CartCleared {
        user_id: Uuid,
    },

    // Coupon events
    CouponApplied {
        user_id: Uuid,
        code: String,
    },
    CouponRemoved {
        user_id: Uuid,
        code: String,
    },
    /// A previously valid coupon no longer passed re-validation after a cart
    /// mutation and was dropped.
    CouponDropped {
        user_id: Uuid,
        code: String,
        reason: String,
    },

    // Order events
    OrderCreated(Uuid),
    OrderItemsCreated {
        order_id: Uuid,
        item_count: usize,
    },
    OrderPlacementFailed {
        user_id: Uuid,
        reason: String,
    },
    /// The order row exists without items; manual or resume recovery needed.
    PartialOrderDetected {
        order_id: Uuid,
    },
    OrderItemsResumed {
        order_id: Uuid,
        item_count: usize,
    },
}

/// Thin wrapper around an mpsc sender so services can publish events without
/// caring who listens.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiving end.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    /// Sends an event, failing if the channel is closed or full.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing the calling operation.
    /// Event delivery must never abort a checkout step.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_delivers_event() {
        let (sender, mut rx) = EventSender::channel(8);
        let order_id = Uuid::new_v4();

        sender
            .send(Event::OrderCreated(order_id))
            .await
            .expect("send should succeed");

        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_or_log_swallows_closed_channel() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);

        // Must not panic or error out.
        sender
            .send_or_log(Event::CartCleared {
                user_id: Uuid::new_v4(),
            })
            .await;
    }

    #[tokio::test]
    async fn test_send_fails_when_receiver_dropped() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);

        let result = sender.send(Event::OrderCreated(Uuid::new_v4())).await;
        assert!(result.is_err());
    }
}
