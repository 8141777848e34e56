//! Redis cache implementation.

use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::{info, warn};

use super::{Cache, Result};
use crate::utils::retry::connection_backoff;

/// Redis-backed cache.
///
/// Key format: `{prefix}:{key}`, or `{key}` with an empty prefix.
pub struct RedisCache {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisCache {
    /// Connect with exponential backoff.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., redis://localhost:6379)
    /// * `key_prefix` - Prefix for all keys, empty for none
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = (|| ConnectionManager::new(client.clone()))
            .retry(connection_backoff())
            .notify(|err: &redis::RedisError, dur: Duration| {
                warn!(service = "redis", error = %err, delay = ?dur, "Connection failed, retrying");
            })
            .await?;

        info!(url = %url, "Connected to Redis for caching");

        Ok(Self {
            conn,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.full_key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(self.full_key(key), value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }
}
