//! Mock message bus implementation for testing.
//!
//! Records every publish and can simulate transport failure. Delivery and
//! request/reply go through an inner [`ChannelBus`], so handlers and
//! responders behave as they would on the real substrate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{BusError, ChannelBus, Message, MessageBus, MessageHandler, Result, Subscription};

/// Mock message bus for testing.
#[derive(Default)]
pub struct MockMessageBus {
    inner: ChannelBus,
    published: RwLock<Vec<Message>>,
    fail_on_publish: RwLock<bool>,
}

impl MockMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn take_published(&self) -> Vec<Message> {
        std::mem::take(&mut *self.published.write().await)
    }

    async fn record(&self, message: &Message) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Publish("Mock publish failure".to_string()));
        }
        self.published.write().await.push(message.clone());
        Ok(())
    }
}

#[async_trait]
impl MessageBus for MockMessageBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.record(&Message::new(subject, payload.clone())).await?;
        self.inner.publish(subject, payload).await
    }

    async fn publish_with_reply(&self, subject: &str, reply: &str, payload: Bytes) -> Result<()> {
        self.record(&Message::new(subject, payload.clone()).with_reply(reply))
            .await?;
        self.inner.publish_with_reply(subject, reply, payload).await
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        self.inner.subscribe(subject, handler).await
    }

    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Message> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Publish("Mock publish failure".to_string()));
        }
        self.inner.request(subject, payload, timeout).await
    }
}
