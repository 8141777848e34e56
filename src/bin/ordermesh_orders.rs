//! ordermesh-orders: order service
//!
//! Materializes `order.created` events into the order store (one record per
//! event id) and answers `orders.all`.
//!
//! ## Configuration
//! ```yaml
//! messaging:
//!   type: nats
//! storage:
//!   orders:
//!     type: mongodb
//!     uri: mongodb://localhost:27017
//!     database: app
//! flags:
//!   provider: ofrep
//!   url: http://localhost:8016
//! ```

use tracing::info;

use ordermesh::bus::init_message_bus;
use ordermesh::runtime::{start_order_service, stop};
use ordermesh::utils::bootstrap::{load_config_and_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = load_config_and_tracing()?;

    let bus = init_message_bus(&config.messaging).await?;
    let subscriptions = start_order_service(bus, &config).await?;

    shutdown_signal().await;

    stop(subscriptions);
    info!("Order service stopped");
    Ok(())
}
