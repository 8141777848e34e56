//! API boundary.
//!
//! [`Resolver`] binds the API operations (`createOrder`, `orders`,
//! `getPrice`, `lastOrderCreated`, `products`, `productById`) to the command
//! publisher, the query bridge and the live fan-out. [`rest`] serves it
//! over HTTP.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde::Deserialize;

use crate::bus::{BusError, MessageBus};
use crate::handlers::stream::DEFAULT_SUBSCRIBER_BUFFER;
use crate::handlers::{
    CommandError, CommandPublisher, OrderFanout, OrderSubscription, QueryBridge, QueryError,
};
use crate::model::{Order, Product};

pub mod rest;

/// Gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// HTTP port.
    pub port: u16,
    /// Wait for a query reply, in milliseconds.
    pub request_timeout_ms: u64,
    /// Per-client buffer for live order streams.
    pub subscriber_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_ms: 3000,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Errors surfaced to API clients.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Live subscription unavailable: {0}")]
    Subscribe(#[from] BusError),
}

impl ResolverError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Command(CommandError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Command(CommandError::Publish(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Command(CommandError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Query(QueryError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Query(QueryError::Decode { .. }) => StatusCode::BAD_GATEWAY,
            Self::Query(QueryError::Transport(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Subscribe(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Resolves API operations against the broker.
pub struct Resolver {
    commands: CommandPublisher,
    queries: QueryBridge,
    fanout: OrderFanout,
}

impl Resolver {
    pub fn new(bus: Arc<dyn MessageBus>, config: &GatewayConfig) -> Self {
        Self {
            commands: CommandPublisher::new(Arc::clone(&bus)),
            queries: QueryBridge::new(Arc::clone(&bus), config.request_timeout()),
            fanout: OrderFanout::new(bus, config.subscriber_buffer),
        }
    }

    /// `createOrder(productId, qty)`: provisional order, not yet persisted.
    pub async fn create_order(&self, product_id: &str, qty: i32) -> Result<Order, ResolverError> {
        Ok(self.commands.create_order(product_id, qty).await?)
    }

    /// `orders`
    pub async fn orders(&self) -> Result<Vec<Order>, ResolverError> {
        Ok(self.queries.list_orders().await?)
    }

    /// `getPrice(productId)`
    pub async fn get_price(&self, product_id: &str) -> Result<i64, ResolverError> {
        Ok(self.queries.product_price(product_id).await?)
    }

    /// `productById(id)`
    pub async fn product_by_id(&self, product_id: &str) -> Result<Product, ResolverError> {
        Ok(self.queries.product(product_id).await?)
    }

    /// `products`
    pub async fn products(&self) -> Result<Vec<Product>, ResolverError> {
        Ok(self.queries.products().await?)
    }

    /// `lastOrderCreated`: one live stream per client.
    pub async fn last_order_created(&self) -> Result<OrderSubscription, ResolverError> {
        Ok(self.fanout.subscribe().await?)
    }

    pub fn live_subscribers(&self) -> usize {
        self.fanout.subscriber_count()
    }
}
