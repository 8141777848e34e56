//! ordermesh-standalone: every service in one process
//!
//! ## Architecture
//! ```text
//! ordermesh-standalone (single process)
//!     │
//!     ├── Gateway (HTTP :8080)    ── publish / request ──┐
//!     ├── Order service           ◄── order.created ─────┤
//!     │                           ◄── orders.all ────────┤  ChannelBus
//!     └── Product service         ◄── product.* ─────────┘
//! ```
//!
//! The broker is always the in-memory channel bus; `messaging` is ignored.

use std::sync::Arc;

use tracing::{info, warn};

use ordermesh::bus::{ChannelBus, MessageBus, MessagingType};
use ordermesh::gateway::{rest, Resolver};
use ordermesh::runtime::{start_order_service, start_product_service, stop};
use ordermesh::utils::bootstrap::{load_config_and_tracing, run_until_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = load_config_and_tracing()?;

    if config.messaging.messaging_type != MessagingType::Channel {
        warn!(
            messaging_type = ?config.messaging.messaging_type,
            "Standalone mode always uses the channel bus"
        );
    }
    let bus: Arc<dyn MessageBus> = Arc::new(ChannelBus::new());

    let mut subscriptions = start_order_service(Arc::clone(&bus), &config).await?;
    subscriptions.extend(start_product_service(Arc::clone(&bus), &config).await?);

    let resolver = Arc::new(Resolver::new(bus, &config.gateway));
    info!(addr = %config.gateway.bind_address(), "Starting ordermesh standalone");

    let result = run_until_shutdown(rest::serve(resolver, &config.gateway.bind_address())).await;

    stop(subscriptions);
    info!("Standalone stopped");
    result
}
