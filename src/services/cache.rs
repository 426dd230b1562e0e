use anyhow::Result;
use moka::future::Cache;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Connects to Redis, or returns None so callers can degrade to their
/// in-memory fallback.
pub(crate) async fn connect_redis(redis_url: &str) -> Option<ConnectionManager> {
    match redis::Client::open(redis_url) {
        Ok(client) => match client.get_connection_manager().await {
            Ok(conn) => {
                tracing::info!("Redis connected successfully");
                Some(conn)
            }
            Err(e) => {
                tracing::warn!("Redis connection failed: {}, using memory only", e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Redis client creation failed: {}, using memory only", e);
            None
        }
    }
}

pub struct CacheService {
    redis: Option<ConnectionManager>,
    memory: Arc<Cache<String, String>>,
}

impl CacheService {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let redis = connect_redis(redis_url).await;

        let memory = Arc::new(
            Cache::builder()
                .max_capacity(1000)
                .time_to_live(Duration::from_secs(60))
                .build(),
        );

        Ok(Self { redis, memory })
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if let Some(cached) = self.memory.get(key).await {
            if let Ok(value) = serde_json::from_str(&cached) {
                tracing::debug!("Memory cache hit for key: {}", key);
                return Ok(Some(value));
            }
        }

        if let Some(mut redis) = self.redis.clone() {
            match redis.get::<_, Option<String>>(key).await {
                Ok(Some(cached)) => {
                    if let Ok(value) = serde_json::from_str(&cached) {
                        self.memory.insert(key.to_string(), cached).await;
                        tracing::debug!("Redis cache hit for key: {}", key);
                        return Ok(Some(value));
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Redis get error: {}", e),
            }
        }

        tracing::debug!("Cache miss for key: {}", key);
        Ok(None)
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        let serialized = serde_json::to_string(value)?;

        self.memory.insert(key.to_string(), serialized.clone()).await;

        if let Some(mut redis) = self.redis.clone() {
            if let Err(e) = redis.set_ex::<_, _, ()>(key, serialized, ttl_secs).await {
                tracing::warn!("Redis set error: {}", e);
            } else {
                tracing::debug!("Cached key: {} with TTL: {}s", key, ttl_secs);
            }
        }

        Ok(())
    }

    pub async fn ping(&self) -> Result<bool> {
        if let Some(mut redis) = self.redis.clone() {
            match redis::cmd("PING").query_async::<_, String>(&mut redis).await {
                Ok(_) => Ok(true),
                Err(_) => Ok(false),
            }
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Port 1 refuses immediately, so the service starts memory-only.
    const UNREACHABLE_REDIS: &str = "redis://127.0.0.1:1/";

    #[test]
    fn memory_tier_round_trips_without_redis() {
        tokio_test::block_on(async {
            let cache = CacheService::new(UNREACHABLE_REDIS).await.unwrap();

            cache.set("ticker:BTC", &"26864.12".to_string(), 10).await.unwrap();
            let got: Option<String> = cache.get("ticker:BTC").await.unwrap();
            assert_eq!(got.as_deref(), Some("26864.12"));

            let miss: Option<String> = cache.get("ticker:ETH").await.unwrap();
            assert!(miss.is_none());
        });
    }

    #[test]
    fn ping_reports_false_without_redis() {
        tokio_test::block_on(async {
            let cache = CacheService::new(UNREACHABLE_REDIS).await.unwrap();
            assert!(!cache.ping().await.unwrap());
        });
    }
}
