//! Key-value store capability consumed by the lock manager
//!
//! The lock protocol needs only a handful of atomic single-key operations.
//! Every implementation must make `set_if_absent` and `get_and_set` atomic
//! with respect to all other operations on the same key, across every client
//! sharing the store.

mod memory;
mod redis;

use std::time::Duration;

use async_trait::async_trait;
use kvlock_common::Result;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Atomic integer key-value operations backing a lock
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Create `key` with `value` if absent; true iff this call created it.
    async fn set_if_absent(&self, key: &str, value: i64) -> Result<bool>;

    /// Read the value stored at `key`.
    async fn get(&self, key: &str) -> Result<Option<i64>>;

    /// Store `value` and return whatever was there immediately before.
    async fn get_and_set(&self, key: &str, value: i64) -> Result<Option<i64>>;

    /// Remove `key`; succeeds whether or not it existed.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Let the store drop `key` on its own after `ttl`.
    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Release connections held by this store.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
