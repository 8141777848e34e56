//! Handler dispatch utilities.
//!
//! Shared delivery loop for bus implementations: each message runs in its
//! own task so a failing or panicking handler cannot take the subscription
//! down with it.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{debug, error, warn};

use super::{Message, MessageHandler};

/// Result of delivering one message to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// Handler completed successfully.
    Success,
    /// Handler returned an error.
    HandlerFailed,
    /// Handler panicked.
    Panicked,
    /// Handler task was cancelled before completing.
    Cancelled,
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Deliver one message in an isolated task and wait for it to finish.
pub async fn deliver(handler: &Arc<dyn MessageHandler>, message: Message) -> DispatchResult {
    let subject = message.subject.clone();

    match tokio::spawn(handler.handle(message)).await {
        Ok(Ok(())) => DispatchResult::Success,
        Ok(Err(e)) => {
            error!(subject = %subject, error = %e, "Handler failed");
            DispatchResult::HandlerFailed
        }
        Err(e) if e.is_panic() => {
            error!(subject = %subject, "Handler panicked, subscription continues");
            DispatchResult::Panicked
        }
        Err(_) => {
            warn!(subject = %subject, "Handler task cancelled");
            DispatchResult::Cancelled
        }
    }
}

/// Deliver every message from `messages`, in order. Returns how many
/// deliveries did not succeed.
pub async fn deliver_all<S>(messages: S, handler: &Arc<dyn MessageHandler>) -> usize
where
    S: Stream<Item = Message>,
{
    let mut messages = Box::pin(messages);
    let mut failed = 0;

    while let Some(message) = messages.next().await {
        if !deliver(handler, message).await.is_success() {
            failed += 1;
        }
    }

    failed
}

/// Drive a subscription until its source closes.
pub async fn run_subscription<S>(subject: String, messages: S, handler: Arc<dyn MessageHandler>)
where
    S: Stream<Item = Message> + Send + 'static,
{
    let failed = deliver_all(messages, &handler).await;
    debug!(subject = %subject, failed, "Subscription source closed");
}
