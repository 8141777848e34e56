//! Idempotent order materializer.
//!
//! Subscribed to `order.created`. Each delivery is decoded and written with
//! insert-if-absent keyed by the event id, so redelivered events leave a
//! single order behind. Malformed payloads are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::bus::{BusError, Message, MessageHandler};
use crate::flags::Flags;
use crate::model::{EventDecodeError, Order, OrderCreated};
use crate::storage::{OrderStore, StorageError};

/// Materializer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaterializerConfig {
    /// Upper bound of the random delay applied while `throttleEnabled` is on.
    pub throttle_max_ms: u64,
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self {
            throttle_max_ms: 500,
        }
    }
}

/// What happened to one delivered payload.
#[derive(Debug)]
pub enum MaterializeOutcome {
    /// Stored, or already present for this event id.
    Persisted { event_id: String },
    /// Not a valid event; nothing was written.
    Discarded(EventDecodeError),
    /// Valid event, but the store rejected the write. Not retried.
    Failed {
        event_id: String,
        error: StorageError,
    },
}

impl MaterializeOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted { .. })
    }
}

/// Turns `order.created` events into stored orders.
#[derive(Clone)]
pub struct Materializer {
    store: Arc<dyn OrderStore>,
    flags: Flags,
    throttle_max: Duration,
    span: Span,
}

impl Materializer {
    pub fn new(store: Arc<dyn OrderStore>, flags: Flags) -> Self {
        Self {
            store,
            flags,
            throttle_max: Duration::from_millis(MaterializerConfig::default().throttle_max_ms),
            span: info_span!(
                "materializer",
                service = "orders",
                component = "materializer"
            ),
        }
    }

    pub fn with_config(mut self, config: &MaterializerConfig) -> Self {
        self.throttle_max = Duration::from_millis(config.throttle_max_ms);
        self
    }

    /// Decode `payload` and persist it once per event id.
    pub async fn materialize(&self, payload: &[u8]) -> MaterializeOutcome {
        async {
            let event = match OrderCreated::decode(payload) {
                Ok(event) => event,
                Err(e) => return MaterializeOutcome::Discarded(e),
            };
            let created_at = match event.timestamp() {
                Ok(ts) => ts,
                Err(e) => return MaterializeOutcome::Discarded(e),
            };

            self.throttle().await;

            let order = Order::materialize(&event, created_at);
            match self.store.insert_if_absent(&event.id, &order).await {
                Ok(()) => MaterializeOutcome::Persisted { event_id: event.id },
                Err(error) => MaterializeOutcome::Failed {
                    event_id: event.id,
                    error,
                },
            }
        }
        .instrument(self.span.clone())
        .await
    }

    async fn throttle(&self) {
        let max_ms = self.throttle_max.as_millis() as u64;
        if max_ms == 0 || !self.flags.throttle_enabled().await {
            return;
        }
        let delay = Duration::from_millis(rand::rng().random_range(0..max_ms));
        debug!(delay = ?delay, "Throttling materialization");
        tokio::time::sleep(delay).await;
    }
}

fn log_outcome(outcome: &MaterializeOutcome) {
    match outcome {
        MaterializeOutcome::Persisted { event_id } => {
            info!(event_id = %event_id, "Order materialized");
        }
        MaterializeOutcome::Discarded(reason) => {
            warn!(error = %reason, "Discarding malformed order event");
        }
        MaterializeOutcome::Failed { event_id, error } => {
            error!(
                event_id = %event_id,
                error = %error,
                unavailable = error.is_unavailable(),
                "Failed to persist order"
            );
        }
    }
}

impl MessageHandler for Materializer {
    fn handle(&self, message: Message) -> BoxFuture<'static, Result<(), BusError>> {
        let materializer = self.clone();
        Box::pin(async move {
            let outcome = materializer.materialize(&message.payload).await;
            log_outcome(&outcome);
            Ok(())
        })
    }
}
