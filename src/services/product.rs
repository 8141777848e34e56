//! Cache-aside product reads.
//!
//! The cache is consulted only while the `redisCacheEnabled` flag is on.
//! Every cache failure falls through to the store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info_span, warn, Instrument, Span};

use crate::cache::Cache;
use crate::flags::Flags;
use crate::model::Product;
use crate::storage::{ProductStore, StorageError};

/// Default cache entry lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Cache key for a product id.
pub fn cache_key(id: &str) -> String {
    format!("product:{}", id)
}

/// Product lookups through an optional read-through cache.
pub struct ProductReader {
    store: Arc<dyn ProductStore>,
    cache: Option<Arc<dyn Cache>>,
    flags: Flags,
    ttl: Duration,
    span: Span,
}

impl ProductReader {
    pub fn new(store: Arc<dyn ProductStore>, flags: Flags) -> Self {
        Self {
            store,
            cache: None,
            flags,
            ttl: DEFAULT_CACHE_TTL,
            span: info_span!(
                "product_reader",
                service = "products",
                component = "product_reader"
            ),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.ttl = ttl;
        self
    }

    /// Look up one product, cache first when enabled.
    pub async fn get_product(&self, id: &str) -> Result<Option<Product>, StorageError> {
        async {
            let cache = match &self.cache {
                Some(cache) if self.flags.cache_enabled().await => Some(cache),
                _ => None,
            };
            let key = cache_key(id);

            if let Some(cache) = cache {
                if let Some(product) = self.cached(cache.as_ref(), &key).await {
                    debug!(product_id = %id, "Cache hit");
                    return Ok(Some(product));
                }
            }

            let product = self.store.get_product(id).await?;

            if let (Some(cache), Some(product)) = (cache, &product) {
                match serde_json::to_string(product) {
                    Ok(json) => {
                        if let Err(e) = cache.set(&key, &json, self.ttl).await {
                            debug!(key = %key, error = %e, "Cache write failed");
                        }
                    }
                    Err(e) => debug!(key = %key, error = %e, "Cache encode failed"),
                }
            }

            Ok(product)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Every product, straight from the store.
    pub async fn list_products(&self) -> Result<Vec<Product>, StorageError> {
        self.store
            .list_products()
            .instrument(self.span.clone())
            .await
    }

    async fn cached(&self, cache: &dyn Cache, key: &str) -> Option<Product> {
        match cache.get(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(product) => Some(product),
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!(key = %key, error = %e, "Cache read failed, falling through");
                None
            }
        }
    }
}
