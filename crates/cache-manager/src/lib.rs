pub mod error;
pub mod redis_store;
pub mod store;
pub mod ttl;

pub use error::{CacheError, CacheResult};
pub use redis_store::RedisStore;
pub use store::{CacheStore, MemoryStore};
pub use ttl::{TtlPolicy, NS_ANALYST, NS_MACRO, NS_NEWS, NS_STOCKS};

use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PREFIX: &str = "marketly";

/// Hit/miss counters since startup
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Namespaced, TTL-aware JSON cache on top of a [`CacheStore`].
///
/// Keys have the form `{prefix}:{namespace}:{identifier}`. The manager is the only component
/// that builds keys or writes cached bytes.
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    prefix: String,
    policy: TtlPolicy,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, prefix: impl Into<String>, policy: TtlPolicy) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            policy,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// In-memory manager with the default prefix and TTL presets
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), DEFAULT_PREFIX, TtlPolicy::default())
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Deterministic key for a (namespace, identifier) pair.
    ///
    /// `:` and `%` in the namespace are percent-escaped, so the first `:` after the prefix
    /// always ends the namespace and distinct pairs never share a key.
    pub fn make_key(&self, namespace: &str, identifier: &str) -> String {
        format!("{}:{}:{}", self.prefix, escape_namespace(namespace), identifier)
    }

    pub fn ttl_for(&self, namespace: &str) -> Duration {
        self.policy.ttl_for(namespace)
    }

    /// Read and deserialize a cached value. `Ok(None)` means missing or expired.
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: &str,
        identifier: &str,
    ) -> CacheResult<Option<T>> {
        let key = self.make_key(namespace, identifier);
        let raw = match self.store.get_raw(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        match raw {
            Some(json) => {
                let value = serde_json::from_str(&json).map_err(|e| {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    CacheError::Serialization(format!("{}: {}", key, e))
                })?;
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Cache hit for {}", key);
                Ok(Some(value))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Cache miss for {}", key);
                Ok(None)
            }
        }
    }

    /// Serialize and store a value. Without an explicit `ttl` the namespace preset applies.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        identifier: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let ttl = ttl.unwrap_or_else(|| self.policy.ttl_for(namespace));
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }

        let key = self.make_key(namespace, identifier);
        let json = serde_json::to_string(value)?;
        self.store.set_raw(&key, json, ttl).await?;

        tracing::debug!("Cached {} for {}s", key, ttl.as_secs());
        Ok(())
    }

    /// Remove exactly one entry; `true` when it existed
    pub async fn delete_entry(&self, namespace: &str, identifier: &str) -> CacheResult<bool> {
        let key = self.make_key(namespace, identifier);
        let removed = self.store.delete_raw(&key).await?;
        tracing::debug!("Invalidated {}: {}", key, removed);
        Ok(removed)
    }

    /// Identifiers of live entries in `namespace` starting with `identifier_prefix`
    pub async fn identifiers(&self, namespace: &str, identifier_prefix: &str) -> CacheResult<Vec<String>> {
        let namespace_prefix = self.make_key(namespace, "");
        let keys = self
            .store
            .keys_with_prefix(&self.make_key(namespace, identifier_prefix))
            .await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&namespace_prefix).map(str::to_string))
            .collect())
    }

    /// Remove every entry in `namespace` whose identifier starts with `identifier_prefix`
    pub async fn delete(&self, namespace: &str, identifier_prefix: &str) -> CacheResult<usize> {
        let key_prefix = self.make_key(namespace, identifier_prefix);
        let deleted = self.store.delete_prefix(&key_prefix).await?;
        tracing::info!("Invalidated {} cache entries under {}", deleted, key_prefix);
        Ok(deleted)
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            hits,
            misses,
            hit_rate,
        }
    }
}

fn escape_namespace(namespace: &str) -> String {
    namespace.replace('%', "%25").replace(':', "%3A")
}
