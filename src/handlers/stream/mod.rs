//! Live order fan-out.
//!
//! One shared broker subscription on `order.created` feeds any number of
//! client streams. Each client owns a bounded channel; a full channel drops
//! the new order for that client only, with a warning, so a slow consumer
//! never holds up the others.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::Stream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::bus::{subjects, BusError, Message, MessageBus, MessageHandler, Subscription};
use crate::model::{Order, OrderCreated};

/// Default per-client buffer.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 32;

type SubscriberId = u64;

/// Registered client channels.
#[derive(Default)]
pub(crate) struct Subscribers {
    senders: Mutex<HashMap<SubscriberId, mpsc::Sender<Order>>>,
    next_id: AtomicU64,
}

impl Subscribers {
    fn register(&self, sender: mpsc::Sender<Order>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sender);
        id
    }

    fn remove(&self, id: SubscriberId) {
        let removed = self
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            debug!(subscriber = id, "Subscriber removed");
        }
    }

    fn len(&self) -> usize {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Offer `order` to every live client without blocking.
    pub(crate) fn offer(&self, order: &Order) {
        let mut senders = self
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut closed = Vec::new();
        let mut sent_count = 0;

        for (id, sender) in senders.iter() {
            match sender.try_send(order.clone()) {
                Ok(()) => sent_count += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscriber = id,
                        event_id = %order.event_id,
                        "Subscriber buffer full, dropping order"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        // Remove closed subscribers
        if !closed.is_empty() {
            debug!(removed = closed.len(), "Removing disconnected subscribers during delivery");
            for id in closed {
                senders.remove(&id);
            }
        }

        debug!(
            event_id = %order.event_id,
            sent = sent_count,
            remaining = senders.len(),
            "Order delivered to subscribers"
        );
    }
}

/// Broker handler that feeds the registered clients.
struct FanoutHandler {
    subscribers: Arc<Subscribers>,
}

impl MessageHandler for FanoutHandler {
    fn handle(&self, message: Message) -> BoxFuture<'static, Result<(), BusError>> {
        let subscribers = Arc::clone(&self.subscribers);
        Box::pin(async move {
            let decoded = OrderCreated::decode(&message.payload)
                .and_then(|event| event.timestamp().map(|ts| Order::provisional(&event, ts)));

            match decoded {
                Ok(order) => subscribers.offer(&order),
                Err(e) => warn!(error = %e, "Skipping malformed order event for live subscribers"),
            }
            Ok(())
        })
    }
}

/// Fans `order.created` out to live client streams.
pub struct OrderFanout {
    bus: Arc<dyn MessageBus>,
    subscribers: Arc<Subscribers>,
    broker: AsyncMutex<Option<Subscription>>,
    buffer: usize,
}

impl OrderFanout {
    pub fn new(bus: Arc<dyn MessageBus>, buffer: usize) -> Self {
        Self {
            bus,
            subscribers: Arc::new(Subscribers::default()),
            broker: AsyncMutex::new(None),
            buffer: buffer.max(1),
        }
    }

    /// Open a client stream. The first call registers the shared broker
    /// subscription; later calls reuse it, subscribing again if it has
    /// stopped.
    pub async fn subscribe(&self) -> Result<OrderSubscription, BusError> {
        self.ensure_listening().await?;

        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.subscribers.register(tx);
        debug!(subscriber = id, buffer = self.buffer, "New live subscriber registered");

        Ok(OrderSubscription {
            id,
            subscribers: Arc::clone(&self.subscribers),
            stream: ReceiverStream::new(rx),
        })
    }

    /// Number of connected clients.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// True while the shared broker subscription is delivering.
    pub async fn is_listening(&self) -> bool {
        self.broker
            .lock()
            .await
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    async fn ensure_listening(&self) -> Result<(), BusError> {
        let mut broker = self.broker.lock().await;
        if broker.as_ref().is_some_and(Subscription::is_active) {
            return Ok(());
        }

        if let Some(stale) = broker.take() {
            warn!(subject = stale.subject(), "Live fan-out subscription ended, resubscribing");
            stale.unsubscribe();
        }

        let handler = Arc::new(FanoutHandler {
            subscribers: Arc::clone(&self.subscribers),
        });
        let subscription = self.bus.subscribe(subjects::ORDER_CREATED, handler).await?;
        info!(subject = subjects::ORDER_CREATED, "Live fan-out subscribed");
        *broker = Some(subscription);
        Ok(())
    }
}

/// One client's live order stream. Dropping it unregisters the client.
pub struct OrderSubscription {
    id: SubscriberId,
    subscribers: Arc<Subscribers>,
    stream: ReceiverStream<Order>,
}

impl OrderSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Stream for OrderSubscription {
    type Item = Order;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Order>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl Drop for OrderSubscription {
    fn drop(&mut self) {
        self.subscribers.remove(self.id);
    }
}

#[cfg(test)]
mod tests;
