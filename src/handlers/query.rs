//! Query bridge: synchronous reads over broker request/reply.
//!
//! Every call is a single request with a bounded wait. No retries; a
//! missing answer surfaces as [`QueryError::Timeout`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::{debug, info_span, Instrument, Span};

use crate::bus::{subjects, BusError, MessageBus};
use crate::model::{Order, Product};

/// Default wait for a reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors from the query side.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("No reply on '{subject}' within {timeout:?}")]
    Timeout { subject: String, timeout: Duration },

    #[error("Undecodable reply on '{subject}': {source}")]
    Decode {
        subject: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Request failed: {0}")]
    Transport(BusError),
}

impl From<BusError> for QueryError {
    fn from(error: BusError) -> Self {
        match error {
            BusError::Timeout { subject, timeout } => Self::Timeout { subject, timeout },
            other => Self::Transport(other),
        }
    }
}

/// Reads aggregate data from remote services.
pub struct QueryBridge {
    bus: Arc<dyn MessageBus>,
    timeout: Duration,
    span: Span,
}

impl QueryBridge {
    pub fn new(bus: Arc<dyn MessageBus>, timeout: Duration) -> Self {
        Self {
            bus,
            timeout,
            span: info_span!(
                "query_bridge",
                service = "gateway",
                component = "query_bridge"
            ),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// All materialized orders.
    pub async fn list_orders(&self) -> Result<Vec<Order>, QueryError> {
        self.request(subjects::ORDERS_ALL, Bytes::new()).await
    }

    /// Price of one product.
    pub async fn product_price(&self, product_id: &str) -> Result<i64, QueryError> {
        self.request(subjects::PRODUCT_PRICE, Bytes::from(product_id.to_string()))
            .await
    }

    /// One product.
    pub async fn product(&self, product_id: &str) -> Result<Product, QueryError> {
        self.request(subjects::PRODUCT_GET, Bytes::from(product_id.to_string()))
            .await
    }

    /// Every product.
    pub async fn products(&self) -> Result<Vec<Product>, QueryError> {
        self.request(subjects::PRODUCTS_ALL, Bytes::new()).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        subject: &str,
        payload: Bytes,
    ) -> Result<T, QueryError> {
        async {
            let reply = self.bus.request(subject, payload, self.timeout).await?;
            debug!(subject = %subject, bytes = reply.payload.len(), "Reply received");

            serde_json::from_slice(&reply.payload).map_err(|source| QueryError::Decode {
                subject: subject.to_string(),
                source,
            })
        }
        .instrument(self.span.clone())
        .await
    }
}
