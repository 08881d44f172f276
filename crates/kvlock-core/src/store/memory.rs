//! In-process key-value store with the same atomic semantics as the remote one
//!
//! Each operation runs under the `dashmap` shard lock of its key, which makes
//! the check-and-write steps of `set_if_absent` and `get_and_set` atomic.
//! Store-level TTLs are enforced lazily: an expired entry behaves as absent
//! and is overwritten or purged on the next write.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use kvlock_common::Result;

use super::KvStore;

#[derive(Debug, Clone, Copy)]
struct StoredValue {
    value: i64,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: i64) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Shared in-memory store; clones see the same entries
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys that have not reached their store-level TTL
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining store-level TTL of `key`, `None` when absent or persistent
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Drop every entry whose store-level TTL has passed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, v| !v.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: i64) -> Result<bool> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(StoredValue::new(value));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(StoredValue::new(value));
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<i64>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value))
    }

    async fn get_and_set(&self, key: &str, value: i64) -> Result<Option<i64>> {
        let now = Instant::now();
        // Like GETSET, the write discards any store-level TTL on the key.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let previous = entry.insert(StoredValue::new(value));
                Ok((!previous.is_expired(now)).then_some(previous.value))
            }
            Entry::Vacant(entry) => {
                entry.insert(StoredValue::new(value));
                Ok(None)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key)
            && !entry.is_expired(now)
        {
            entry.expires_at = Some(now + ttl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_only_creates_once() {
        let store = MemoryStore::new();

        assert!(store.set_if_absent("k", 1).await.unwrap());
        assert!(!store.set_if_absent("k", 2).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_get_and_set_returns_previous() {
        let store = MemoryStore::new();

        assert_eq!(store.get_and_set("k", 10).await.unwrap(), None);
        assert_eq!(store.get_and_set("k", 20).await.unwrap(), Some(10));
        assert_eq!(store.get("k").await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();

        store.delete("missing").await.unwrap();
        store.set_if_absent("k", 1).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expiry_makes_key_absent() {
        let store = MemoryStore::new();

        store.set_if_absent("k", 1).await.unwrap();
        store
            .set_expiry("k", Duration::from_millis(20))
            .await
            .unwrap();
        assert!(store.ttl("k").is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.get_and_set("k", 2).await.unwrap(), None);
        assert!(store.ttl("k").is_none());
    }

    #[tokio::test]
    async fn test_set_if_absent_reclaims_expired_key() {
        let store = MemoryStore::new();

        store.set_if_absent("k", 1).await.unwrap();
        store
            .set_expiry("k", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;

        assert!(store.set_if_absent("k", 2).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_set_expiry_on_missing_key_is_noop() {
        let store = MemoryStore::new();

        store
            .set_expiry("missing", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();

        store.set_if_absent("short", 1).await.unwrap();
        store.set_if_absent("long", 2).await.unwrap();
        store
            .set_expiry("short", Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let store = MemoryStore::new();
        let other = store.clone();

        store.set_if_absent("k", 5).await.unwrap();
        assert_eq!(other.get("k").await.unwrap(), Some(5));
    }
}
