//! Service wiring shared by the binaries.
//!
//! Each `start_*` function builds a service's components from configuration,
//! attaches them to `bus`, and returns the live subscriptions. Binaries keep
//! the subscriptions until shutdown, then pass them to [`stop`].

use std::sync::Arc;

use tracing::info;

use crate::bus::{subjects, MessageBus, Subscription};
use crate::cache::init_cache;
use crate::config::Config;
use crate::flags::init_flags;
use crate::handlers::{Materializer, OrdersResponder, ProductResponder};
use crate::services::ProductReader;
use crate::storage::{init_order_store, init_product_store};

type InitResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Order service: materializer on `order.created`, responder on `orders.all`.
pub async fn start_order_service(
    bus: Arc<dyn MessageBus>,
    config: &Config,
) -> InitResult<Vec<Subscription>> {
    let flags = init_flags(&config.flags)?;
    let store = init_order_store(&config.storage.orders).await?;

    let materializer =
        Materializer::new(Arc::clone(&store), flags).with_config(&config.materializer);

    let mut subscriptions = Vec::with_capacity(2);
    subscriptions.push(
        bus.subscribe(subjects::ORDER_CREATED, Arc::new(materializer))
            .await?,
    );
    subscriptions.push(OrdersResponder::new(Arc::clone(&bus), store).serve().await?);

    info!(service = "orders", "Order service started");
    Ok(subscriptions)
}

/// Product service: cache-aside reader behind the product responders.
pub async fn start_product_service(
    bus: Arc<dyn MessageBus>,
    config: &Config,
) -> InitResult<Vec<Subscription>> {
    let flags = init_flags(&config.flags)?;
    let store = init_product_store(&config.storage.products).await?;

    let mut reader = ProductReader::new(store, flags);
    if let Some(cache) = init_cache(&config.cache).await? {
        reader = reader.with_cache(cache, config.cache.ttl());
    }

    let subscriptions = ProductResponder::new(bus, Arc::new(reader))
        .serve()
        .await?;

    info!(service = "products", "Product service started");
    Ok(subscriptions)
}

/// Unsubscribe everything `start_*` returned.
pub fn stop(subscriptions: Vec<Subscription>) {
    for subscription in subscriptions {
        subscription.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::bus::ChannelBus;
    use crate::model::{Order, OrderCreated};
    use crate::storage::{OrderStoreType, ProductStoreType};

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.storage.orders.store_type = OrderStoreType::Memory;
        config.storage.products.store_type = ProductStoreType::Memory;
        config.materializer.throttle_max_ms = 0;
        config
    }

    #[tokio::test]
    async fn test_services_answer_over_shared_bus() {
        let bus: Arc<dyn MessageBus> = Arc::new(ChannelBus::new());
        let config = memory_config();

        let orders = start_order_service(Arc::clone(&bus), &config).await.unwrap();
        let products = start_product_service(Arc::clone(&bus), &config)
            .await
            .unwrap();

        let event = OrderCreated::new("p1", 2);
        bus.publish(subjects::ORDER_CREATED, Bytes::from(event.encode().unwrap()))
            .await
            .unwrap();
        crate::test_utils::settle().await;

        let reply = bus
            .request(subjects::ORDERS_ALL, Bytes::new(), Duration::from_secs(1))
            .await
            .unwrap();
        let listed: Vec<Order> = serde_json::from_slice(&reply.payload).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].product_id, "p1");

        let reply = bus
            .request(
                subjects::PRODUCT_PRICE,
                Bytes::from_static(b"p1"),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        let price: i64 = serde_json::from_slice(&reply.payload).unwrap();
        assert_eq!(price, 199);

        stop(orders);
        stop(products);
    }
}
