//! kvlock Core - Distributed locks over an atomic key-value store
//!
//! This crate provides:
//! - `LockManager`: acquire / renew / release / status for named locks
//! - `KvStore`: the narrow store capability the lock protocol runs on
//! - `MemoryStore`: in-process store with the same atomic semantics
//! - `RedisStore`: pooled Redis store
//! - Metrics counters for lock outcomes
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use kvlock_core::{LockConfig, LockManager};
//!
//! let config = LockConfig::new("127.0.0.1:6379").with_key_prefix("jobs");
//! let manager = LockManager::connect(&config).await?;
//!
//! if manager.acquire("nightly-report", Duration::from_secs(30)).await? {
//!     // ... do the work, renewing before the ttl runs out ...
//!     manager.release("nightly-report").await?;
//! }
//!
//! manager.close().await?;
//! ```
//!
//! The lock record carries no owner identity: `renew` and `release` trust the
//! caller, and correctness assumes the clocks of cooperating clients agree.

pub mod manager;
pub mod metrics;
pub mod model;
pub mod store;

pub use kvlock_common::{LockConfig, LockError, Result};
pub use manager::{LockManager, ManagerOptions};
pub use metrics::{AcquireOutcome, init_metrics};
pub use model::LockStatus;
pub use store::{KvStore, MemoryStore, RedisStore};
