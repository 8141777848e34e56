//! Command publisher: turns a create-order request into an `order.created`
//! event and returns a provisional order without waiting for persistence.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, info_span, Instrument, Span};

use crate::bus::{subjects, BusError, MessageBus};
use crate::model::{Order, OrderCreated};

/// Errors from the command side.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Publish failed: {0}")]
    Publish(#[from] BusError),

    #[error("Event encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Publishes create-order events.
pub struct CommandPublisher {
    bus: Arc<dyn MessageBus>,
    span: Span,
}

impl CommandPublisher {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
            span: info_span!(
                "command_publisher",
                service = "gateway",
                component = "command_publisher"
            ),
        }
    }

    /// Validate, publish one event, and return the provisional order.
    ///
    /// The returned order carries `id == event_id`; the stored record gets
    /// its own id once the materializer runs. A successful return does not
    /// mean the order has been stored.
    pub async fn create_order(&self, product_id: &str, qty: i32) -> Result<Order, CommandError> {
        if product_id.trim().is_empty() {
            return Err(CommandError::Validation("productId is required".to_string()));
        }
        if qty < 1 {
            return Err(CommandError::Validation(format!(
                "qty must be at least 1, got {}",
                qty
            )));
        }

        async {
            let event = OrderCreated::new(product_id, qty);
            // Generated timestamp is always RFC3339.
            let created_at = event
                .timestamp()
                .map_err(|e| CommandError::Validation(e.to_string()))?;
            let payload = Bytes::from(event.encode()?);

            self.bus.publish(subjects::ORDER_CREATED, payload).await?;

            info!(event_id = %event.id, product_id = %event.product_id, qty, "Order event published");

            Ok(Order::provisional(&event, created_at))
        }
        .instrument(self.span.clone())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MockMessageBus;

    fn setup() -> (Arc<MockMessageBus>, CommandPublisher) {
        let bus = Arc::new(MockMessageBus::new());
        let publisher = CommandPublisher::new(bus.clone());
        (bus, publisher)
    }

    #[tokio::test]
    async fn test_create_order_publishes_event() {
        let (bus, publisher) = setup();

        let order = publisher.create_order("p1", 3).await.unwrap();

        assert_eq!(order.id, order.event_id);
        assert_eq!(order.product_id, "p1");
        assert_eq!(order.qty, 3);

        let published = bus.take_published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].subject, subjects::ORDER_CREATED);

        let event = OrderCreated::decode(&published[0].payload).unwrap();
        assert_eq!(event.id, order.id);
        assert_eq!(event.product_id, "p1");
        assert_eq!(event.qty, 3);
        assert_eq!(event.timestamp().unwrap(), order.created_at);
    }

    #[tokio::test]
    async fn test_event_ids_unique_per_call() {
        let (bus, publisher) = setup();

        let a = publisher.create_order("p1", 1).await.unwrap();
        let b = publisher.create_order("p1", 1).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(bus.published_count().await, 2);
    }

    #[tokio::test]
    async fn test_validation_rejects_before_publish() {
        let (bus, publisher) = setup();

        assert!(matches!(
            publisher.create_order("p1", 0).await,
            Err(CommandError::Validation(_))
        ));
        assert!(matches!(
            publisher.create_order("", 1).await,
            Err(CommandError::Validation(_))
        ));
        assert_eq!(bus.published_count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces() {
        let (bus, publisher) = setup();
        bus.set_fail_on_publish(true).await;

        assert!(matches!(
            publisher.create_order("p1", 1).await,
            Err(CommandError::Publish(_))
        ));
    }
}
