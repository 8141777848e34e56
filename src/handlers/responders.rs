//! Broker-side answers to the query bridge.
//!
//! A responder that cannot answer (store failure, unknown product) logs and
//! sends nothing; the requester sees a timeout rather than a zero value.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::bus::{respond, subjects, BusError, Message, MessageBus, MessageHandler, Subscription};
use crate::services::product::ProductReader;
use crate::storage::OrderStore;

/// Product id from a request body: raw UTF-8 or a JSON string.
fn product_id(payload: &[u8]) -> Option<String> {
    let id = if payload.first() == Some(&b'"') {
        serde_json::from_slice::<String>(payload).ok()?
    } else {
        std::str::from_utf8(payload).ok()?.to_string()
    };
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

async fn reply_json<T: Serialize>(
    bus: &dyn MessageBus,
    request: &Message,
    value: &T,
) -> Result<(), BusError> {
    let body = serde_json::to_vec(value)
        .map_err(|e| BusError::Publish(format!("Reply encoding failed: {}", e)))?;
    respond(bus, request, Bytes::from(body)).await
}

/// Answers `orders.all` from the order store.
#[derive(Clone)]
pub struct OrdersResponder {
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn OrderStore>,
    span: Span,
}

impl OrdersResponder {
    pub fn new(bus: Arc<dyn MessageBus>, store: Arc<dyn OrderStore>) -> Self {
        Self {
            bus,
            store,
            span: info_span!(
                "orders_responder",
                service = "orders",
                component = "orders_responder"
            ),
        }
    }

    /// Subscribe on `orders.all`.
    pub async fn serve(self) -> Result<Subscription, BusError> {
        let bus = Arc::clone(&self.bus);
        let subscription = bus.subscribe(subjects::ORDERS_ALL, Arc::new(self)).await?;
        info!(subject = subjects::ORDERS_ALL, "Orders responder listening");
        Ok(subscription)
    }

    async fn answer(&self, request: Message) -> Result<(), BusError> {
        if request.reply.is_none() {
            warn!(subject = %request.subject, "Ignoring request without reply subject");
            return Ok(());
        }

        let orders = match self.store.list_all().await {
            Ok(orders) => orders,
            Err(e) => {
                error!(error = %e, "Failed to list orders, not replying");
                return Ok(());
            }
        };

        debug!(count = orders.len(), "Replying with orders");
        reply_json(self.bus.as_ref(), &request, &orders).await
    }
}

impl MessageHandler for OrdersResponder {
    fn handle(&self, message: Message) -> BoxFuture<'static, Result<(), BusError>> {
        let responder = self.clone();
        let span = self.span.clone();
        Box::pin(async move { responder.answer(message).await }.instrument(span))
    }
}

/// Answers `product.price`, `product.get` and `products.all`.
#[derive(Clone)]
pub struct ProductResponder {
    bus: Arc<dyn MessageBus>,
    reader: Arc<ProductReader>,
    span: Span,
}

impl ProductResponder {
    pub fn new(bus: Arc<dyn MessageBus>, reader: Arc<ProductReader>) -> Self {
        Self {
            bus,
            reader,
            span: info_span!(
                "product_responder",
                service = "products",
                component = "product_responder"
            ),
        }
    }

    /// Subscribe on every product subject.
    pub async fn serve(self) -> Result<Vec<Subscription>, BusError> {
        let handler = Arc::new(self);
        let mut subscriptions = Vec::with_capacity(3);
        for subject in [
            subjects::PRODUCT_PRICE,
            subjects::PRODUCT_GET,
            subjects::PRODUCTS_ALL,
        ] {
            subscriptions.push(handler.bus.subscribe(subject, handler.clone()).await?);
            info!(subject, "Product responder listening");
        }
        Ok(subscriptions)
    }

    async fn answer(&self, request: Message) -> Result<(), BusError> {
        if request.reply.is_none() {
            warn!(subject = %request.subject, "Ignoring request without reply subject");
            return Ok(());
        }

        if request.subject == subjects::PRODUCTS_ALL {
            return match self.reader.list_products().await {
                Ok(products) => reply_json(self.bus.as_ref(), &request, &products).await,
                Err(e) => {
                    error!(error = %e, "Failed to list products, not replying");
                    Ok(())
                }
            };
        }

        let Some(id) = product_id(&request.payload) else {
            warn!(subject = %request.subject, "Request without product id, not replying");
            return Ok(());
        };

        let product = match self.reader.get_product(&id).await {
            Ok(Some(product)) => product,
            Ok(None) => {
                warn!(product_id = %id, "Unknown product, not replying");
                return Ok(());
            }
            Err(e) => {
                error!(product_id = %id, error = %e, "Product lookup failed, not replying");
                return Ok(());
            }
        };

        match request.subject.as_str() {
            subjects::PRODUCT_PRICE => reply_json(self.bus.as_ref(), &request, &product.price).await,
            subjects::PRODUCT_GET => reply_json(self.bus.as_ref(), &request, &product).await,
            other => {
                warn!(subject = %other, "Unexpected subject for product responder");
                Ok(())
            }
        }
    }
}

impl MessageHandler for ProductResponder {
    fn handle(&self, message: Message) -> BoxFuture<'static, Result<(), BusError>> {
        let responder = self.clone();
        let span = self.span.clone();
        Box::pin(async move { responder.answer(message).await }.instrument(span))
    }
}
