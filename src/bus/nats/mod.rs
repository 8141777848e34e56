//! NATS core messaging implementation.
//!
//! Plain (non-JetStream) subjects: at-most-once delivery, which is what the
//! materializer's insert-if-absent is built to tolerate.
//!
//! # Configuration
//!
//! ```yaml
//! messaging:
//!   type: nats
//!   nats:
//!     url: "nats://localhost:4222"
//!     name: "ordermesh-gateway"
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_nats::{Client, ConnectOptions, RequestErrorKind};
use async_trait::async_trait;
use backon::Retryable;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{info, warn};

use super::dispatch::run_subscription;
use super::{BusError, Message, MessageBus, MessageHandler, NatsConfig, Result, Subscription};
use crate::utils::retry::connection_backoff;

/// Message bus over a NATS client connection.
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
}

impl NatsBus {
    /// Connect with exponential backoff.
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        let url = config.url.clone();
        let name = config.name.clone();

        let client = (|| {
            let url = url.clone();
            let name = name.clone();
            async move {
                let mut options = ConnectOptions::new();
                if let Some(name) = name {
                    options = options.name(name);
                }
                options.connect(url.as_str()).await.map_err(|e| e.to_string())
            }
        })
        .retry(connection_backoff())
        .notify(|err: &String, dur: Duration| {
            warn!(service = "nats", error = %err, delay = ?dur, "Connection failed, retrying");
        })
        .await
        .map_err(BusError::Connection)?;

        info!(url = %config.url, "Connected to NATS");

        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn into_message(message: async_nats::Message) -> Message {
    Message {
        subject: message.subject.to_string(),
        reply: message.reply.map(|r| r.to_string()),
        payload: message.payload,
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(subject = %subject))]
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    async fn publish_with_reply(&self, subject: &str, reply: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish_with_reply(subject.to_string(), reply.to_string(), payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let task = tokio::spawn(run_subscription(
            subject.to_string(),
            subscriber.map(into_message),
            handler,
        ));

        info!(subject = %subject, "NATS subscription started");

        // Aborting the task drops the subscriber, which unsubscribes server-side.
        Ok(Subscription::new(subject, task))
    }

    #[tracing::instrument(name = "bus.request", skip_all, fields(subject = %subject))]
    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Message> {
        let timed_out = || BusError::Timeout {
            subject: subject.to_string(),
            timeout,
        };

        match tokio::time::timeout(timeout, self.client.request(subject.to_string(), payload)).await
        {
            Ok(Ok(reply)) => Ok(into_message(reply)),
            Ok(Err(e)) => match e.kind() {
                RequestErrorKind::TimedOut | RequestErrorKind::NoResponders => Err(timed_out()),
                RequestErrorKind::Other => Err(BusError::Request(e.to_string())),
            },
            Err(_) => Err(timed_out()),
        }
    }
}
