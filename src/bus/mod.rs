//! Message broker port.
//!
//! This module contains:
//! - `MessageBus` trait: publish, subscribe-with-handler, request/reply
//! - `MessageHandler` trait: for processing delivered messages
//! - `Subscription`: cancelable handle returned by `subscribe`
//! - Bus configuration types and the `init_message_bus` factory
//! - Implementations: in-process channel bus, NATS, Mock

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::info;

// Implementation modules
pub mod channel;
pub(crate) mod dispatch;
pub mod mock;
#[cfg(feature = "nats")]
pub mod nats;

// Re-exports
pub use channel::ChannelBus;
pub use mock::MockMessageBus;
#[cfg(feature = "nats")]
pub use nats::NatsBus;

/// Subjects shared by the gateway and the backing services.
pub mod subjects {
    /// Creation events, consumed by the materializer and the live fan-out.
    pub const ORDER_CREATED: &str = "order.created";
    /// Request: list every materialized order.
    pub const ORDERS_ALL: &str = "orders.all";
    /// Request: price of a single product (payload: product id).
    pub const PRODUCT_PRICE: &str = "product.price";
    /// Request: a single product (payload: product id).
    pub const PRODUCT_GET: &str = "product.get";
    /// Request: every product.
    pub const PRODUCTS_ALL: &str = "products.all";
}

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("No reply within {timeout:?} on '{subject}'")]
    Timeout { subject: String, timeout: Duration },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Message on '{0}' has no reply subject")]
    NoReplySubject(String),

    #[error("Handler '{name}' failed: {message}")]
    HandlerFailed { name: String, message: String },
}

impl BusError {
    /// True when a request got no answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Subject the message was published on.
    pub subject: String,
    /// Subject the publisher expects a reply on, if any.
    pub reply: Option<String>,
    /// Raw payload.
    pub payload: Bytes,
}

impl Message {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            reply: None,
            payload: payload.into(),
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }
}

/// Handler for processing messages delivered on a subscription.
///
/// Each invocation runs in its own task. An error or panic is logged by the
/// bus and never ends the subscription.
pub trait MessageHandler: Send + Sync {
    /// Process one message.
    fn handle(&self, message: Message) -> BoxFuture<'static, std::result::Result<(), BusError>>;
}

/// Interface to the shared messaging substrate.
///
/// Implementations:
/// - `ChannelBus`: in-process, for standalone mode and tests
/// - `NatsBus`: NATS core messaging
/// - `MockMessageBus`: records publishes, can simulate transport failure
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Fire-and-forget publish. Errors only on local transport failure.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;

    /// Publish carrying a reply subject.
    async fn publish_with_reply(&self, subject: &str, reply: &str, payload: Bytes) -> Result<()>;

    /// Register `handler` for every message delivered on `subject`.
    ///
    /// Messages on one subscription are handed to the handler in arrival
    /// order, one at a time. Separate subscriptions run concurrently.
    async fn subscribe(&self, subject: &str, handler: Arc<dyn MessageHandler>)
        -> Result<Subscription>;

    /// Publish `payload` and wait for exactly one reply.
    ///
    /// Fails with `BusError::Timeout` when nothing answers within `timeout`.
    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Message>;
}

/// Reply to a request message on its reply subject.
pub async fn respond(bus: &dyn MessageBus, request: &Message, payload: Bytes) -> Result<()> {
    match request.reply.as_deref() {
        Some(reply) => bus.publish(reply, payload).await,
        None => Err(BusError::NoReplySubject(request.subject.clone())),
    }
}

// ============================================================================
// Subscription handle
// ============================================================================

type Detach = Box<dyn FnOnce() + Send + Sync>;

/// Handle to a live subscription.
///
/// Dropping the handle leaves the subscription running; call
/// [`Subscription::unsubscribe`] to stop delivery.
pub struct Subscription {
    subject: String,
    task: JoinHandle<()>,
    detach: Option<Detach>,
}

impl Subscription {
    pub(crate) fn new(subject: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            subject: subject.into(),
            task,
            detach: None,
        }
    }

    /// Run `detach` synchronously when the subscription is cancelled.
    pub(crate) fn on_unsubscribe(mut self, detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.detach = Some(Box::new(detach));
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// True until the subscription is cancelled or its source closes.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop delivery. Messages published afterwards are not handed to the
    /// handler; an invocation already in flight runs to completion.
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
        self.task.abort();
        info!(subject = %self.subject, "Unsubscribed");
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Messaging type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// In-process channels (single process only).
    #[default]
    Channel,
    /// NATS core messaging.
    Nats,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// NATS-specific configuration.
    pub nats: NatsConfig,
}

/// NATS-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// Server URL.
    pub url: String,
    /// Connection name reported to the server.
    pub name: Option<String>,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            name: None,
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize the message bus based on configuration.
///
/// Requires the corresponding feature to be enabled:
/// - Channel: always available
/// - NATS: `--features nats`
pub async fn init_message_bus(
    config: &MessagingConfig,
) -> std::result::Result<Arc<dyn MessageBus>, Box<dyn std::error::Error + Send + Sync>> {
    match config.messaging_type {
        MessagingType::Channel => {
            info!(messaging_type = "channel", "Message bus initialized");
            Ok(Arc::new(ChannelBus::new()))
        }
        MessagingType::Nats => {
            #[cfg(feature = "nats")]
            {
                let bus = NatsBus::connect(&config.nats).await?;
                info!(messaging_type = "nats", url = %config.nats.url, "Message bus initialized");
                Ok(Arc::new(bus))
            }

            #[cfg(not(feature = "nats"))]
            {
                Err("NATS support requires the 'nats' feature. Rebuild with --features nats".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messaging_config_default() {
        let config = MessagingConfig::default();
        assert_eq!(config.messaging_type, MessagingType::Channel);
        assert_eq!(config.nats.url, "nats://localhost:4222");
    }

    #[test]
    fn test_timeout_is_distinguishable() {
        let err = BusError::Timeout {
            subject: subjects::PRODUCT_PRICE.to_string(),
            timeout: Duration::from_secs(3),
        };
        assert!(err.is_timeout());
        assert!(!BusError::Publish("down".to_string()).is_timeout());
    }

    #[tokio::test]
    async fn test_respond_without_reply_subject() {
        let bus = ChannelBus::new();
        let request = Message::new(subjects::ORDERS_ALL, Bytes::new());

        let result = respond(&bus, &request, Bytes::from_static(b"[]")).await;
        assert!(matches!(result, Err(BusError::NoReplySubject(_))));
    }

    #[tokio::test]
    async fn test_init_channel_bus() {
        let bus = init_message_bus(&MessagingConfig::default()).await;
        assert!(bus.is_ok());
    }
}
