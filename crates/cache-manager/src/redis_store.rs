//! Redis-backed cache store.

use crate::error::{CacheError, CacheResult};
use crate::store::CacheStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::time::Duration;

const SCAN_BATCH: usize = 200;

/// Shared Redis connection. Cloning is cheap; every clone multiplexes the same socket.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect and verify the server answers PING
    pub async fn connect(url: &str) -> CacheResult<Self> {
        tracing::info!("Connecting to Redis cache...");

        let client = Client::open(url).map_err(|e| CacheError::Connection(e.to_string()))?;
        let mut connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(map_redis_error)?;
        if pong != "PONG" {
            return Err(CacheError::Connection(format!("unexpected PING reply: {}", pong)));
        }

        tracing::info!("Redis cache connection established");
        Ok(Self { connection })
    }
}

fn map_redis_error(err: RedisError) -> CacheError {
    if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() || err.is_timeout() {
        CacheError::Connection(err.to_string())
    } else {
        CacheError::Command(err.to_string())
    }
}

/// Escape glob metacharacters so a literal prefix can be used in `SCAN MATCH`
pub(crate) fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl CacheStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get(key).await.map_err(map_redis_error)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let secs = ttl.as_secs().max(1);
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, secs)
            .await
            .map_err(map_redis_error)
    }

    async fn delete_raw(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.del(key).await.map_err(map_redis_error)?;
        Ok(removed > 0)
    }

    async fn keys_with_prefix(&self, key_prefix: &str) -> CacheResult<Vec<String>> {
        let pattern = format!("{}*", escape_glob(key_prefix));
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
            found.extend(keys);

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        found.sort_unstable();
        found.dedup();
        Ok(found)
    }

    async fn delete_prefix(&self, key_prefix: &str) -> CacheResult<usize> {
        let keys = self.keys_with_prefix(key_prefix).await?;
        let mut conn = self.connection.clone();
        let mut deleted = 0usize;

        for batch in keys.chunks(SCAN_BATCH) {
            let removed: i64 = conn.del(batch).await.map_err(map_redis_error)?;
            deleted += usize::try_from(removed).unwrap_or(0);
        }

        tracing::debug!("Deleted {} Redis keys under {}", deleted, key_prefix);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("marketly:news:AAPL_"), "marketly:news:AAPL_");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at REDIS_URL"]
    async fn test_redis_roundtrip() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let store = RedisStore::connect(&url).await.unwrap();

        store
            .set_raw("marketly-test:stocks:AAPL", "{}".to_string(), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(store.get_raw("marketly-test:stocks:AAPL").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(store.delete_prefix("marketly-test:stocks:").await.unwrap(), 1);
    }
}
