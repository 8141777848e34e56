//! SQLite storage integration tests.
//!
//! Run with: cargo test --test storage_sqlite --features sqlite
//!
//! Each test uses a fresh database file in a temporary directory.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use futures::future::join_all;
use tempfile::TempDir;

use ordermesh::model::{Order, OrderCreated};
use ordermesh::storage::{
    init_order_store, init_product_store, OrderStore, OrderStoreConfig, OrderStoreType,
    ProductStore, ProductStoreConfig, ProductStoreType, SqliteOrderStore, SqliteProductStore,
};

async fn connect(dir: &TempDir) -> sqlx::SqlitePool {
    let path = dir.path().join("ordermesh.db");
    sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await
        .expect("Failed to open SQLite database")
}

async fn order_store(dir: &TempDir) -> SqliteOrderStore {
    let store = SqliteOrderStore::new(connect(dir).await);
    store.init().await.expect("Failed to create orders table");
    store
}

fn order_for(event: &OrderCreated) -> Order {
    Order::materialize(event, event.timestamp().unwrap())
}

#[tokio::test]
async fn test_insert_if_absent_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = order_store(&dir).await;
    let event = OrderCreated::new("p1", 2);

    // Each delivery gets a fresh record id; only the event id dedups.
    for _ in 0..3 {
        store
            .insert_if_absent(&event.id, &order_for(&event))
            .await
            .unwrap();
    }

    let orders = store.list_all().await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].event_id, event.id);
    assert_eq!(orders[0].product_id, "p1");
    assert_eq!(orders[0].qty, 2);
}

#[tokio::test]
async fn test_concurrent_inserts_same_event() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(order_store(&dir).await);
    let event = OrderCreated::new("p1", 1);

    let inserts = (0..8).map(|_| {
        let store = Arc::clone(&store);
        let order = order_for(&event);
        let event_id = event.id.clone();
        async move { store.insert_if_absent(&event_id, &order).await }
    });

    for result in join_all(inserts).await {
        result.unwrap();
    }

    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_all_oldest_first() {
    let dir = TempDir::new().unwrap();
    let store = order_store(&dir).await;
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    for (offset, product) in [(2, "late"), (0, "early"), (1, "middle")] {
        let event = OrderCreated::new(product, 1);
        let order = Order::materialize(&event, base + Duration::minutes(offset));
        store.insert_if_absent(&event.id, &order).await.unwrap();
    }

    let products: Vec<String> = store
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.product_id)
        .collect();
    assert_eq!(products, vec!["early", "middle", "late"]);
}

#[tokio::test]
async fn test_created_at_survives_storage() {
    let dir = TempDir::new().unwrap();
    let store = order_store(&dir).await;
    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
    let event = OrderCreated::new("p1", 1);

    store
        .insert_if_absent(&event.id, &Order::materialize(&event, ts))
        .await
        .unwrap();

    assert_eq!(store.list_all().await.unwrap()[0].created_at, ts);
}

#[tokio::test]
async fn test_orders_persist_across_connections() {
    let dir = TempDir::new().unwrap();
    let event = OrderCreated::new("p1", 5);

    {
        let store = order_store(&dir).await;
        store
            .insert_if_absent(&event.id, &order_for(&event))
            .await
            .unwrap();
    }

    let reopened = order_store(&dir).await;
    reopened
        .insert_if_absent(&event.id, &order_for(&event))
        .await
        .unwrap();
    assert_eq!(reopened.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_product_seed_is_repeatable() {
    let dir = TempDir::new().unwrap();
    let store = SqliteProductStore::new(connect(&dir).await);
    store.init().await.unwrap();

    store.seed_defaults().await.unwrap();
    store.seed_defaults().await.unwrap();

    let products = store.list_products().await.unwrap();
    assert_eq!(products.len(), 1);
    let widget = store.get_product("p1").await.unwrap().unwrap();
    assert_eq!(widget.name, "Widget");
    assert_eq!(widget.price, 199);
    assert!(store.get_product("missing-product").await.unwrap().is_none());
}

#[tokio::test]
async fn test_init_from_config_creates_database_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("ordermesh.db");
    let path = path.to_str().unwrap().to_string();

    let orders = init_order_store(&OrderStoreConfig {
        store_type: OrderStoreType::Sqlite,
        path: path.clone(),
        ..Default::default()
    })
    .await
    .unwrap();
    let products = init_product_store(&ProductStoreConfig {
        store_type: ProductStoreType::Sqlite,
        path: path.clone(),
        ..Default::default()
    })
    .await
    .unwrap();

    assert!(std::path::Path::new(&path).exists());
    assert!(orders.list_all().await.unwrap().is_empty());
    assert_eq!(products.get_product("p1").await.unwrap().unwrap().price, 199);
}
