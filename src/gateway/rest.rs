//! HTTP surface for the resolver.
//!
//! - `POST /orders`: `createOrder`
//! - `GET /orders`: `orders`
//! - `GET /orders/live`: `lastOrderCreated`, Server-Sent Events
//! - `GET /products`: `products`
//! - `GET /products/:id`: `productById`
//! - `GET /products/:id/price`: `getPrice`
//! - `GET /health`: health check

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{Resolver, ResolverError};
use crate::model::{Order, Product};

/// Shared state for axum handlers.
type AppState = Arc<Resolver>;

/// Start the HTTP server on `addr`.
///
/// With port 0 the OS assigns an ephemeral port; the bound address is logged.
pub async fn serve(
    resolver: Arc<Resolver>,
    addr: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Gateway HTTP API listening");
    axum::serve(listener, router(resolver)).await?;
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router(resolver: Arc<Resolver>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/orders", get(orders).post(create_order))
        .route("/orders/live", get(last_order_created))
        .route("/products", get(products))
        .route("/products/:id", get(product_by_id))
        .route("/products/:id/price", get(get_price))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(resolver)
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
    #[serde(rename = "productId", alias = "product_id")]
    product_id: String,
    qty: i32,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ResolverError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = %status, error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn create_order(
    State(resolver): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<Order>, ResolverError> {
    let order = resolver
        .create_order(&request.product_id, request.qty)
        .await?;
    Ok(Json(order))
}

async fn orders(State(resolver): State<AppState>) -> Result<Json<Vec<Order>>, ResolverError> {
    Ok(Json(resolver.orders().await?))
}

async fn products(State(resolver): State<AppState>) -> Result<Json<Vec<Product>>, ResolverError> {
    Ok(Json(resolver.products().await?))
}

async fn product_by_id(
    State(resolver): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ResolverError> {
    Ok(Json(resolver.product_by_id(&id).await?))
}

async fn get_price(
    State(resolver): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<i64>, ResolverError> {
    Ok(Json(resolver.get_price(&id).await?))
}

async fn last_order_created(
    State(resolver): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ResolverError> {
    let subscription = resolver.last_order_created().await?;
    let events = subscription.map(|order| Event::default().event("order").json_data(&order));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{ChannelBus, MessageBus};
    use crate::gateway::GatewayConfig;
    use std::time::Duration;

    async fn spawn_gateway(bus: Arc<dyn MessageBus>) -> (String, Arc<Resolver>) {
        let config = GatewayConfig {
            request_timeout_ms: 50,
            ..Default::default()
        };
        let resolver = Arc::new(Resolver::new(bus, &config));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = router(Arc::clone(&resolver));
        tokio::spawn(async move { axum::serve(listener, app).await });
        (base, resolver)
    }

    #[tokio::test]
    async fn test_health() {
        let (base, _) = spawn_gateway(Arc::new(ChannelBus::new())).await;

        let response = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_order() {
        let (base, _) = spawn_gateway(Arc::new(ChannelBus::new())).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/orders"))
            .json(&serde_json::json!({ "productId": "p1", "qty": 3 }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let order: Order = response.json().await.unwrap();
        assert_eq!(order.product_id, "p1");
        assert_eq!(order.qty, 3);
        assert_eq!(order.id, order.event_id);
    }

    #[tokio::test]
    async fn test_create_order_validation() {
        let (base, _) = spawn_gateway(Arc::new(ChannelBus::new())).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/orders"))
            .json(&serde_json::json!({ "productId": "p1", "qty": 0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_price_timeout_maps_to_504() {
        let (base, _) = spawn_gateway(Arc::new(ChannelBus::new())).await;

        let response = reqwest::get(format!("{base}/products/missing-product/price"))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_live_orders_stream() {
        let (base, resolver) = spawn_gateway(Arc::new(ChannelBus::new())).await;
        let client = reqwest::Client::new();

        let mut live = client
            .get(format!("{base}/orders/live"))
            .send()
            .await
            .unwrap();
        assert_eq!(live.status(), reqwest::StatusCode::OK);

        // Wait for the stream handler to register before publishing.
        while resolver.live_subscribers() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let order: Order = client
            .post(format!("{base}/orders"))
            .json(&serde_json::json!({ "productId": "p1", "qty": 1 }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let mut received = String::new();
        while !received.contains(&order.event_id) {
            let chunk = tokio::time::timeout(Duration::from_secs(2), live.chunk())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            received.push_str(&String::from_utf8_lossy(&chunk));
        }
        assert!(received.contains("event: order"));
    }
}
