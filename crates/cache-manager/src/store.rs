use crate::error::CacheResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Raw string key-value store with per-entry expiry.
///
/// Keys arrive fully formed from [`crate::CacheManager`]; stores never build keys themselves.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Stored value, or `None` when missing or expired
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value (last write wins)
    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    /// Remove one key; `true` when a live entry was removed
    async fn delete_raw(&self, key: &str) -> CacheResult<bool>;

    /// Live keys starting with `key_prefix`, in no particular order
    async fn keys_with_prefix(&self, key_prefix: &str) -> CacheResult<Vec<String>>;

    /// Remove every key starting with `key_prefix`; returns how many were removed
    async fn delete_prefix(&self, key_prefix: &str) -> CacheResult<usize>;
}

/// Internal cache entry with expiry deadline
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process store used when no Redis is configured, and in tests
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, including keys that are never read again
    fn purge_expired(&self, now: Instant) {
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Lazily drop the expired entry
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let now = Instant::now();
        self.purge_expired(now);
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete_raw(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.expires_at > now))
    }

    async fn keys_with_prefix(&self, key_prefix: &str) -> CacheResult<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(key_prefix) && e.expires_at > now)
            .map(|e| e.key().clone())
            .collect())
    }

    async fn delete_prefix(&self, key_prefix: &str) -> CacheResult<usize> {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|key, entry| {
            if entry.expires_at <= now {
                return false;
            }
            if key.starts_with(key_prefix) {
                removed += 1;
                return false;
            }
            true
        });
        Ok(removed)
    }
}
