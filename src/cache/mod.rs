//! Cache port for read-through product lookups.
//!
//! - `Cache` trait: string get / set-with-TTL
//! - `MemoryCache`: expiring in-process map
//! - `RedisCache`: Redis via `ConnectionManager` (feature `redis`)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Key/value cache with per-entry expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    /// `None` on a miss or an expired entry.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

/// Entry count above which `set` sweeps out expired entries.
const DEFAULT_SWEEP_THRESHOLD: usize = 1024;

/// Value plus its deadline. `None` never expires.
type Entry = (String, Option<Instant>);

fn is_live(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.map_or(true, |deadline| deadline > now)
}

/// In-memory cache.
///
/// Expired entries are evicted on read, and swept in bulk by `set` once the
/// map grows past the sweep threshold.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    sweep_threshold: usize,
    fail: RwLock<bool>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            fail: RwLock::new(false),
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold;
        self
    }

    /// Make every call fail, for exercising fall-through paths.
    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn check(&self) -> Result<()> {
        if *self.fail.read().await {
            return Err(CacheError::Backend("Mock cache failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check().await?;

        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some((value, expires_at)) if is_live(*expires_at, now) => {
                    return Ok(Some(value.clone()))
                }
                Some(_) => {}
            }
        }

        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check().await?;

        let now = Instant::now();
        // A deadline past what Instant can represent never expires.
        let expires_at = now.checked_add(ttl);

        let mut entries = self.entries.write().await;
        if entries.len() >= self.sweep_threshold {
            let before = entries.len();
            entries.retain(|_, (_, deadline)| is_live(*deadline, now));
            debug!(swept = before - entries.len(), "Swept expired cache entries");
        }
        entries.insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Cache backend discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    /// No cache; every lookup reads the store.
    #[default]
    None,
    Memory,
    Redis,
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(rename = "type")]
    pub cache_type: CacheType,
    /// Redis connection URL.
    pub url: String,
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
    /// Prefix prepended to every key as `{prefix}:{key}`. Empty for none.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: CacheType::None,
            url: "redis://localhost:6379".to_string(),
            ttl_secs: 300,
            key_prefix: String::new(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Initialize the cache based on configuration. `None` when disabled.
pub async fn init_cache(
    config: &CacheConfig,
) -> std::result::Result<Option<Arc<dyn Cache>>, Box<dyn std::error::Error + Send + Sync>> {
    match config.cache_type {
        CacheType::None => {
            info!(cache = "none", "Cache disabled");
            Ok(None)
        }
        CacheType::Memory => {
            info!(cache = "memory", ttl_secs = config.ttl_secs, "Cache initialized");
            Ok(Some(Arc::new(MemoryCache::new())))
        }
        CacheType::Redis => {
            #[cfg(feature = "redis")]
            {
                let cache = RedisCache::connect(&config.url, &config.key_prefix).await?;
                info!(cache = "redis", ttl_secs = config.ttl_secs, "Cache initialized");
                Ok(Some(Arc::new(cache)))
            }

            #[cfg(not(feature = "redis"))]
            {
                tracing::error!("Redis cache requested but 'redis' feature is not enabled");
                Err("Redis feature not enabled".into())
            }
        }
    }
}
