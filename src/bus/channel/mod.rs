//! In-memory channel-based message bus for standalone mode.
//!
//! Subjects are routed to per-subscription unbounded channels within a
//! single process. Ideal for local development and testing without an
//! external broker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

use super::dispatch::run_subscription;
use super::{BusError, Message, MessageBus, MessageHandler, Result, Subscription};

/// Prefix for ephemeral reply subjects.
const INBOX_PREFIX: &str = "_INBOX";

type Route = (u64, mpsc::UnboundedSender<Message>);

#[derive(Default)]
struct Routes {
    by_subject: RwLock<HashMap<String, Vec<Route>>>,
    next_id: AtomicU64,
}

impl Routes {
    fn add(&self, subject: &str, sender: mpsc::UnboundedSender<Message>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.by_subject
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(subject.to_string())
            .or_default()
            .push((id, sender));
        id
    }

    fn remove(&self, subject: &str, id: u64) {
        let mut routes = self
            .by_subject
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(senders) = routes.get_mut(subject) {
            senders.retain(|(route_id, _)| *route_id != id);
            if senders.is_empty() {
                routes.remove(subject);
            }
        }
    }

    /// Hand `message` to every route on its subject. Returns receiver count.
    fn route(&self, message: Message) -> usize {
        let routes = self
            .by_subject
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(senders) = routes.get(&message.subject) else {
            return 0;
        };

        senders
            .iter()
            .filter(|(_, tx)| tx.send(message.clone()).is_ok())
            .count()
    }

    fn count(&self, subject: &str) -> usize {
        self.by_subject
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subject)
            .map_or(0, Vec::len)
    }
}

/// Removes an inbox route when the waiting request goes away.
struct InboxGuard {
    routes: Arc<Routes>,
    subject: String,
    id: u64,
}

impl Drop for InboxGuard {
    fn drop(&mut self) {
        self.routes.remove(&self.subject, self.id);
    }
}

/// In-memory message bus.
///
/// Cloning yields another handle to the same routing table, so services
/// wired in one process share a single substrate.
#[derive(Clone, Default)]
pub struct ChannelBus {
    routes: Arc<Routes>,
}

impl ChannelBus {
    /// Create a new channel bus.
    pub fn new() -> Self {
        info!("Channel message bus initialized");
        Self::default()
    }

    /// Number of live subscriptions on `subject`.
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.routes.count(subject)
    }

    fn send(&self, message: Message) {
        let subject = message.subject.clone();
        let receivers = self.routes.route(message);
        debug!(subject = %subject, receivers, "Published message via channel");
    }
}

#[async_trait]
impl MessageBus for ChannelBus {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(subject = %subject))]
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.send(Message::new(subject, payload));
        Ok(())
    }

    async fn publish_with_reply(&self, subject: &str, reply: &str, payload: Bytes) -> Result<()> {
        self.send(Message::new(subject, payload).with_reply(reply));
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.routes.add(subject, tx);

        let task = tokio::spawn(run_subscription(
            subject.to_string(),
            UnboundedReceiverStream::new(rx),
            handler,
        ));

        info!(subject = %subject, "Channel subscription started");

        let routes = Arc::clone(&self.routes);
        let owned = subject.to_string();
        Ok(Subscription::new(subject, task).on_unsubscribe(move || routes.remove(&owned, id)))
    }

    #[tracing::instrument(name = "bus.request", skip_all, fields(subject = %subject))]
    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Message> {
        let inbox = format!("{}.{}", INBOX_PREFIX, Uuid::new_v4().simple());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = InboxGuard {
            routes: Arc::clone(&self.routes),
            id: self.routes.add(&inbox, tx),
            subject: inbox.clone(),
        };

        self.send(Message::new(subject, payload).with_reply(&inbox));

        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(BusError::Request(format!("Reply inbox for '{subject}' closed"))),
            Err(_) => Err(BusError::Timeout {
                subject: subject.to_string(),
                timeout,
            }),
        }
    }
}
