use moka::future::Cache;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::services::cache::connect_redis;

/// Set of payment proofs that have already bought a response. A transaction
/// hash settles exactly one request; a second request carrying the same
/// hash is a replay regardless of how valid the transfer itself is.
///
/// Consumed marks live in Redis when it is reachable (shared across
/// replicas, survives restarts) and always in a local TTL cache, both
/// bounded by the configured retention window.
pub struct ReplayGuard {
    redis: Option<ConnectionManager>,
    seen: Cache<String, ()>,
    retention: Duration,
}

impl ReplayGuard {
    pub async fn new(redis_url: &str, retention: Duration) -> Self {
        Self {
            redis: connect_redis(redis_url).await,
            seen: Self::memory(retention),
            retention,
        }
    }

    /// Memory-only guard, used in tests and as the degraded mode shape.
    pub fn in_memory(retention: Duration) -> Self {
        Self {
            redis: None,
            seen: Self::memory(retention),
            retention,
        }
    }

    fn memory(retention: Duration) -> Cache<String, ()> {
        Cache::builder()
            .max_capacity(100_000)
            .time_to_live(retention)
            .build()
    }

    fn key(tx_hash: &str) -> String {
        format!("proof:consumed:{}", tx_hash.to_ascii_lowercase())
    }

    /// Cheap pre-check so replays are bounced before any RPC budget is
    /// spent. Admission still goes through `try_consume`.
    pub async fn already_consumed(&self, tx_hash: &str) -> bool {
        let key = Self::key(tx_hash);

        if self.seen.get(&key).await.is_some() {
            return true;
        }

        if let Some(mut redis) = self.redis.clone() {
            match redis::cmd("EXISTS")
                .arg(&key)
                .query_async::<_, i64>(&mut redis)
                .await
            {
                Ok(n) => return n > 0,
                Err(e) => tracing::warn!("Redis EXISTS error: {}", e),
            }
        }

        false
    }

    /// Atomically marks the proof consumed. Returns false when some other
    /// request consumed it first; exactly one concurrent caller wins.
    pub async fn try_consume(&self, tx_hash: &str) -> bool {
        let key = Self::key(tx_hash);

        if let Some(mut redis) = self.redis.clone() {
            let reply: Result<Option<String>, redis::RedisError> = redis::cmd("SET")
                .arg(&key)
                .arg(1)
                .arg("NX")
                .arg("EX")
                .arg(self.retention.as_secs())
                .query_async(&mut redis)
                .await;

            match reply {
                Ok(set) => {
                    let fresh = set.is_some();
                    if fresh {
                        self.seen.insert(key, ()).await;
                    }
                    return fresh;
                }
                Err(e) => {
                    tracing::warn!("Redis SET NX error: {}, falling back to memory", e)
                }
            }
        }

        self.seen.entry(key).or_insert(()).await.is_fresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> ReplayGuard {
        ReplayGuard::in_memory(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn first_consume_wins_second_loses() {
        let guard = guard();
        let hash = "0xabc123";

        assert!(guard.try_consume(hash).await);
        assert!(!guard.try_consume(hash).await);
    }

    #[tokio::test]
    async fn consumed_proofs_show_up_in_the_pre_check() {
        let guard = guard();
        let hash = "0xdeadbeef";

        assert!(!guard.already_consumed(hash).await);
        guard.try_consume(hash).await;
        assert!(guard.already_consumed(hash).await);
    }

    #[tokio::test]
    async fn distinct_proofs_are_independent() {
        let guard = guard();

        assert!(guard.try_consume("0x01").await);
        assert!(guard.try_consume("0x02").await);
        assert!(!guard.try_consume("0x01").await);
    }

    #[tokio::test]
    async fn hash_case_does_not_split_identity() {
        let guard = guard();

        assert!(guard.try_consume("0xABCDEF").await);
        assert!(!guard.try_consume("0xabcdef").await);
    }
}
