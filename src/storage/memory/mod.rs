//! In-memory storage implementations for standalone mode and testing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{default_products, OrderStore, ProductStore, Result, StorageError};
use crate::model::{Order, Product};

/// Order store that keeps orders in memory, keyed by `event_id`.
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<String, Order>>,
    fail_on_insert: RwLock<bool>,
    fail_on_list: RwLock<bool>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_insert(&self, fail: bool) {
        *self.fail_on_insert.write().await = fail;
    }

    pub async fn set_fail_on_list(&self, fail: bool) {
        *self.fail_on_list.write().await = fail;
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert_if_absent(&self, event_id: &str, order: &Order) -> Result<()> {
        if *self.fail_on_insert.read().await {
            return Err(StorageError::Unavailable("Mock insert failure".to_string()));
        }
        self.orders
            .write()
            .await
            .entry(event_id.to_string())
            .or_insert_with(|| order.clone());
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        if *self.fail_on_list.read().await {
            return Err(StorageError::Unavailable("Mock list failure".to_string()));
        }
        let mut orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(orders)
    }
}

/// Product store backed by an in-memory catalog.
#[derive(Default)]
pub struct MemoryProductStore {
    products: RwLock<HashMap<String, Product>>,
    fail_on_read: RwLock<bool>,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with the default catalog.
    pub fn with_defaults() -> Self {
        Self::with_products(default_products())
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: RwLock::new(products.into_iter().map(|p| (p.id.clone(), p)).collect()),
            fail_on_read: RwLock::new(false),
        }
    }

    pub async fn put(&self, product: Product) {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product);
    }

    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    async fn check(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Unavailable("Mock read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        self.check().await?;
        Ok(self.products.read().await.get(id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        self.check().await?;
        let mut products: Vec<Product> = self.products.read().await.values().cloned().collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(products)
    }
}
