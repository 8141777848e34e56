//! ordermesh-gateway: HTTP API boundary
//!
//! Publishes `order.created` for `createOrder`, answers reads through broker
//! request/reply and streams materialized orders to connected clients.
//!
//! ## Configuration
//! ```yaml
//! messaging:
//!   type: nats
//!   nats:
//!     url: nats://localhost:4222
//! gateway:
//!   port: 8080
//!   request_timeout_ms: 3000
//! ```

use std::sync::Arc;

use tracing::info;

use ordermesh::bus::init_message_bus;
use ordermesh::gateway::{rest, Resolver};
use ordermesh::utils::bootstrap::{load_config_and_tracing, run_until_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = load_config_and_tracing()?;

    let bus = init_message_bus(&config.messaging).await?;
    let resolver = Arc::new(Resolver::new(bus, &config.gateway));

    info!(
        addr = %config.gateway.bind_address(),
        timeout = ?config.gateway.request_timeout(),
        "Starting ordermesh gateway"
    );

    run_until_shutdown(rest::serve(resolver, &config.gateway.bind_address())).await?;

    info!("Gateway stopped");
    Ok(())
}
