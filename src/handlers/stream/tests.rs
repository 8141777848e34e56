use super::*;
use crate::bus::ChannelBus;
use crate::test_utils::settle;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

fn setup(buffer: usize) -> (ChannelBus, OrderFanout) {
    let bus = ChannelBus::new();
    let fanout = OrderFanout::new(Arc::new(bus.clone()), buffer);
    (bus, fanout)
}

async fn publish_order(bus: &ChannelBus, product_id: &str) -> OrderCreated {
    let event = OrderCreated::new(product_id, 1);
    bus.publish(subjects::ORDER_CREATED, Bytes::from(event.encode().unwrap()))
        .await
        .unwrap();
    event
}

#[tokio::test]
async fn test_subscriber_receives_created_orders() {
    let (bus, fanout) = setup(DEFAULT_SUBSCRIBER_BUFFER);
    let mut sub = fanout.subscribe().await.unwrap();

    let event = publish_order(&bus, "p1").await;

    let order = tokio::time::timeout(Duration::from_secs(1), sub.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.event_id, event.id);
    assert_eq!(order.product_id, "p1");
}

#[tokio::test]
async fn test_single_broker_subscription_shared() {
    let (bus, fanout) = setup(DEFAULT_SUBSCRIBER_BUFFER);

    let _a = fanout.subscribe().await.unwrap();
    let _b = fanout.subscribe().await.unwrap();
    let _c = fanout.subscribe().await.unwrap();

    assert_eq!(bus.subscriber_count(subjects::ORDER_CREATED), 1);
    assert_eq!(fanout.subscriber_count(), 3);
    assert!(fanout.is_listening().await);
}

#[tokio::test]
async fn test_drop_unregisters_deterministically() {
    let (bus, fanout) = setup(DEFAULT_SUBSCRIBER_BUFFER);
    let sub = fanout.subscribe().await.unwrap();
    assert_eq!(fanout.subscriber_count(), 1);

    drop(sub);
    assert_eq!(fanout.subscriber_count(), 0);

    // The shared subscription survives the last client.
    assert_eq!(bus.subscriber_count(subjects::ORDER_CREATED), 1);
    let mut again = fanout.subscribe().await.unwrap();
    let event = publish_order(&bus, "p2").await;
    let order = tokio::time::timeout(Duration::from_secs(1), again.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.event_id, event.id);
}

#[tokio::test]
async fn test_slow_consumer_does_not_block_others() {
    let (bus, fanout) = setup(2);
    let _stalled = fanout.subscribe().await.unwrap();
    let mut active = fanout.subscribe().await.unwrap();

    let mut published = Vec::new();
    for _ in 0..5 {
        published.push(publish_order(&bus, "p1").await.id);
        let order = tokio::time::timeout(Duration::from_secs(1), active.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.event_id, *published.last().unwrap());
    }

    // The stalled client keeps its registration; its overflow was dropped.
    assert_eq!(fanout.subscriber_count(), 2);
}

#[tokio::test]
async fn test_overflow_drops_newest() {
    let (bus, fanout) = setup(2);
    let mut sub = fanout.subscribe().await.unwrap();

    let first = publish_order(&bus, "p1").await;
    let second = publish_order(&bus, "p1").await;
    let _third = publish_order(&bus, "p1").await;
    settle().await;

    assert_eq!(sub.next().await.unwrap().event_id, first.id);
    assert_eq!(sub.next().await.unwrap().event_id, second.id);

    let fourth = publish_order(&bus, "p1").await;
    assert_eq!(sub.next().await.unwrap().event_id, fourth.id);
}

#[tokio::test]
async fn test_malformed_events_skipped() {
    let (bus, fanout) = setup(DEFAULT_SUBSCRIBER_BUFFER);
    let mut sub = fanout.subscribe().await.unwrap();

    bus.publish(subjects::ORDER_CREATED, Bytes::from_static(b"nope"))
        .await
        .unwrap();
    let event = publish_order(&bus, "p1").await;

    let order = tokio::time::timeout(Duration::from_secs(1), sub.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.event_id, event.id);
}

#[test]
fn test_offer_prunes_closed_channels() {
    let subscribers = Subscribers::default();
    let (tx, rx) = mpsc::channel(1);
    subscribers.register(tx);
    drop(rx);

    let event = OrderCreated::new("p1", 1);
    subscribers.offer(&Order::provisional(&event, event.timestamp().unwrap()));

    assert_eq!(subscribers.len(), 0);
}

/// Channel bus whose first subscription ends at once, like a broker
/// connection that closed under it.
struct ClosingBus {
    inner: ChannelBus,
    subscribes: AtomicUsize,
}

#[async_trait::async_trait]
impl MessageBus for ClosingBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        self.inner.publish(subject, payload).await
    }

    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: &str,
        payload: Bytes,
    ) -> Result<(), BusError> {
        self.inner.publish_with_reply(subject, reply, payload).await
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription, BusError> {
        if self.subscribes.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(Subscription::new(subject, tokio::spawn(async {})));
        }
        self.inner.subscribe(subject, handler).await
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, BusError> {
        self.inner.request(subject, payload, timeout).await
    }
}

#[tokio::test]
async fn test_resubscribes_after_broker_subscription_ends() {
    let inner = ChannelBus::new();
    let bus = Arc::new(ClosingBus {
        inner: inner.clone(),
        subscribes: AtomicUsize::new(0),
    });
    let fanout = OrderFanout::new(bus.clone(), DEFAULT_SUBSCRIBER_BUFFER);

    let mut early = fanout.subscribe().await.unwrap();
    settle().await;
    assert!(!fanout.is_listening().await);

    let mut late = fanout.subscribe().await.unwrap();
    assert!(fanout.is_listening().await);
    assert_eq!(bus.subscribes.load(Ordering::SeqCst), 2);
    assert_eq!(inner.subscriber_count(subjects::ORDER_CREATED), 1);

    // Clients registered before the outage are fed by the new subscription.
    let event = publish_order(&inner, "p1").await;
    for sub in [&mut early, &mut late] {
        let order = tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.event_id, event.id);
    }
}

#[tokio::test]
async fn test_live_subscription_is_reused() {
    let inner = ChannelBus::new();
    let bus = Arc::new(ClosingBus {
        inner: inner.clone(),
        // Past the first call: every subscription is a real one.
        subscribes: AtomicUsize::new(1),
    });
    let fanout = OrderFanout::new(bus.clone(), DEFAULT_SUBSCRIBER_BUFFER);

    let _a = fanout.subscribe().await.unwrap();
    let _b = fanout.subscribe().await.unwrap();

    assert_eq!(bus.subscribes.load(Ordering::SeqCst), 2);
    assert_eq!(inner.subscriber_count(subjects::ORDER_CREATED), 1);
}
