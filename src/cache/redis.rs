//! Redis cache backend
//!
//! All keys are stored under a `quillpress:` namespace so that `clear` and
//! pattern deletion never touch keys owned by other applications sharing
//! the same Redis database.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

const NAMESPACE: &str = "quillpress:";

/// Keys fetched per SCAN round trip
const SCAN_COUNT: usize = 200;

pub struct RedisCache {
    connection: MultiplexedConnection,
    default_ttl: Duration,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to Redis; `default_ttl` caps every entry's TTL
    pub async fn connect(redis_url: &str, default_ttl: Duration) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            connection,
            default_ttl,
        })
    }

    fn namespaced(key: &str) -> String {
        format!("{}{}", NAMESPACE, key)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        let pattern = Self::namespaced(pattern);
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .context("Failed to scan keys in Redis")?;

            found.extend(keys);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(found)
    }
}

#[async_trait]
impl CacheLayer for RedisCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn
            .get(Self::namespaced(key))
            .await
            .context("Failed to get value from Redis")?;

        raw.map(|json| serde_json::from_str(&json).context("Failed to deserialize cached value"))
            .transpose()
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        let secs = ttl.min(self.default_ttl).as_secs().max(1);

        let _: () = conn
            .set_ex(Self::namespaced(key), json, secs)
            .await
            .context("Failed to set value in Redis")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(Self::namespaced(key))
            .await
            .context("Failed to delete key from Redis")?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let keys = self.scan_keys(pattern).await?;
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection.clone();
        for chunk in keys.chunks(SCAN_COUNT) {
            let _: () = conn
                .del(chunk)
                .await
                .context("Failed to delete keys from Redis")?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.delete_pattern("*").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[test]
    fn test_namespaced_key() {
        assert_eq!(RedisCache::namespaced("homepage_data"), "quillpress:homepage_data");
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_set_get_delete() {
        let cache = RedisCache::connect(&redis_url(), Duration::from_secs(60))
            .await
            .unwrap();

        cache.set("test:key", &"value".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get::<String>("test:key").await.unwrap(), Some("value".to_string()));

        cache.delete("test:key").await.unwrap();
        assert_eq!(cache.get::<String>("test:key").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_delete_pattern_keeps_other_keys() {
        let cache = RedisCache::connect(&redis_url(), Duration::from_secs(60))
            .await
            .unwrap();
        let ttl = Duration::from_secs(60);

        cache.set("test:comments:post:1", &1, ttl).await.unwrap();
        cache.set("test:comments:post:2", &2, ttl).await.unwrap();
        cache.set("test:homepage", &3, ttl).await.unwrap();

        cache.delete_pattern("test:comments:*").await.unwrap();

        assert_eq!(cache.get::<i32>("test:comments:post:1").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("test:homepage").await.unwrap(), Some(3));

        cache.delete("test:homepage").await.unwrap();
    }
}
