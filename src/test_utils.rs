//! Test utilities and mock handlers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::bus::{BusError, Message, MessageHandler};

/// Handler that counts deliveries and forwards each message to a channel.
pub struct CountingHandler {
    count: Arc<AtomicUsize>,
    tx: mpsc::UnboundedSender<Message>,
}

impl CountingHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = Self {
            count: Arc::new(AtomicUsize::new(0)),
            tx,
        };
        (handler, rx)
    }

    pub fn count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.count)
    }
}

impl MessageHandler for CountingHandler {
    fn handle(&self, message: Message) -> BoxFuture<'static, Result<(), BusError>> {
        let count = Arc::clone(&self.count);
        let tx = self.tx.clone();
        Box::pin(async move {
            count.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(message);
            Ok(())
        })
    }
}

/// Wait long enough for spawned delivery tasks to run.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
