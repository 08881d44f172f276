//! Lock manager: acquire, renew, and release over a shared key-value store
//!
//! All lock state lives in the store as one integer per key, the lock's
//! deadline in nanoseconds since the Unix epoch. The manager itself is a
//! stateless protocol driver; mutual exclusion rests entirely on the store's
//! atomic `set_if_absent` and `get_and_set`.
//!
//! Acquire runs at most three round-trips:
//! 1. `set_if_absent(key, now + ttl)`; creating the key wins.
//! 2. Otherwise `get(key)`. A deadline that has not passed means the lock is
//!    held elsewhere. A passed deadline `E` is stolen with
//!    `get_and_set(key, now + ttl)`, and only the caller that reads back `E`
//!    wins.
//! 3. The winner sets the store-level TTL on the key so a crashed holder's
//!    record is collected by the store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kvlock_common::config::DEFAULT_COMMAND_TIMEOUT_MS;
use kvlock_common::{LockConfig, LockError, Result, deadline_after, now_nanos, prefixed_key};
use tracing::{debug, warn};

use crate::metrics::{self, AcquireOutcome};
use crate::model::LockStatus;
use crate::store::{KvStore, RedisStore};

/// Per-manager settings that are not connection parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Namespace prepended to lock names (empty for none)
    pub key_prefix: String,
    /// Upper bound for one store round-trip
    pub command_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
        }
    }
}

impl ManagerOptions {
    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }
}

impl From<&LockConfig> for ManagerOptions {
    fn from(config: &LockConfig) -> Self {
        Self {
            key_prefix: config.key_prefix.clone(),
            command_timeout: config.command_timeout(),
        }
    }
}

/// Distributed lock manager bound to one key namespace
///
/// Cloning is cheap and shares the store handle.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn KvStore>,
    options: ManagerOptions,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl LockManager {
    pub fn new(store: Arc<dyn KvStore>, options: ManagerOptions) -> Self {
        Self { store, options }
    }

    /// Connect to the Redis store described by `config`.
    ///
    /// Fails with [`LockError::Configuration`] for invalid parameters and
    /// [`LockError::Connection`] when no usable connection can be established.
    pub async fn connect(config: &LockConfig) -> Result<Self> {
        let store = RedisStore::connect(config).await?;
        Ok(Self::new(Arc::new(store), ManagerOptions::from(config)))
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Store key used for the lock called `name`
    pub fn lock_key(&self, name: &str) -> String {
        prefixed_key(&self.options.key_prefix, name)
    }

    /// Try once to take the lock `name` for `ttl`.
    ///
    /// `Ok(false)` means another caller holds the lock or won the race for an
    /// expired one. An `Err` means the lock state is unknown and must not be
    /// treated as acquired, except [`LockError::ExpiryNotSet`] whose
    /// [`LockError::lock_held`] is true.
    pub async fn acquire(&self, name: &str, ttl: Duration) -> Result<bool> {
        let key = self.checked_key(name)?;
        check_ttl(ttl)?;

        let outcome = match self.attempt(&key, ttl).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::record_acquire(AcquireOutcome::Failed);
                return Err(e);
            }
        };
        metrics::record_acquire(outcome);
        debug!(
            key = %key,
            ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            outcome = %outcome,
            "Lock acquire attempt finished"
        );

        if !outcome.acquired() {
            return Ok(false);
        }

        self.apply_backstop(&key, ttl).await?;
        Ok(true)
    }

    /// Push the deadline of `name` to `now + ttl` and refresh its store TTL.
    ///
    /// Ownership is not verified: any caller can renew any lock, and renewing
    /// a lock that no longer exists re-creates it.
    pub async fn renew(&self, name: &str, ttl: Duration) -> Result<bool> {
        let key = self.checked_key(name)?;
        check_ttl(ttl)?;

        let deadline = deadline_for(ttl)?;
        let previous = self
            .timed("get_and_set", &key, self.store.get_and_set(&key, deadline))
            .await?;
        if previous.is_none() {
            debug!(key = %key, "Renewed a lock that had no record");
        }

        self.apply_backstop(&key, ttl).await?;
        metrics::record_renew();
        Ok(true)
    }

    /// Delete the lock `name`. Succeeds whether or not it was held.
    pub async fn release(&self, name: &str) -> Result<()> {
        let key = self.checked_key(name)?;
        self.timed("delete", &key, self.store.delete(&key)).await?;
        metrics::record_release();
        debug!(key = %key, "Lock released");
        Ok(())
    }

    /// Read the current state of `name` without changing it.
    pub async fn status(&self, name: &str) -> Result<LockStatus> {
        let key = self.checked_key(name)?;
        let deadline = self.timed("get", &key, self.store.get(&key)).await?;
        Ok(LockStatus::from_deadline(deadline, now_nanos()))
    }

    /// Release the store handle. Other clones of this manager stop working.
    pub async fn close(self) -> Result<()> {
        self.store.close().await
    }

    /// One pass of the acquire protocol, without the store-level TTL.
    ///
    /// A caller that loses the steal still leaves its own deadline behind, and
    /// its `get_and_set` clears any store TTL the winner already applied. If
    /// the winner then crashes, the record is only reclaimed through its
    /// deadline, never collected by the store.
    async fn attempt(&self, key: &str, ttl: Duration) -> Result<AcquireOutcome> {
        let deadline = deadline_for(ttl)?;
        let created = self
            .timed("set_if_absent", key, self.store.set_if_absent(key, deadline))
            .await?;
        if created {
            return Ok(AcquireOutcome::Created);
        }

        let observed = match self.timed("get", key, self.store.get(key)).await? {
            Some(observed) => observed,
            // Released or collected between the two calls; someone else may
            // already be creating it, so report a lost race instead of retrying.
            None => return Ok(AcquireOutcome::LostRace),
        };
        if observed >= now_nanos() {
            return Ok(AcquireOutcome::Contended);
        }

        let deadline = deadline_for(ttl)?;
        let previous = self
            .timed("get_and_set", key, self.store.get_and_set(key, deadline))
            .await?;
        match previous {
            Some(previous) if previous == observed => Ok(AcquireOutcome::Stolen),
            // The swap re-created a key that vanished after the read.
            None => Ok(AcquireOutcome::Stolen),
            Some(_) => Ok(AcquireOutcome::LostRace),
        }
    }

    async fn apply_backstop(&self, key: &str, ttl: Duration) -> Result<()> {
        self.timed("set_expiry", key, self.store.set_expiry(key, ttl))
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Lock held without a store-level expiry");
                LockError::ExpiryNotSet {
                    key: key.to_string(),
                    source: Box::new(e),
                }
            })
    }

    async fn timed<T, F>(&self, command: &'static str, key: &str, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timeout = self.options.command_timeout;
        match tokio::time::timeout(timeout, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                metrics::record_store_error(command);
                Err(e)
            }
            Err(_) => {
                metrics::record_store_error(command);
                Err(LockError::Timeout {
                    command,
                    key: key.to_string(),
                    timeout,
                })
            }
        }
    }

    fn checked_key(&self, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(LockError::InvalidArgument(
                "lock name must not be empty".to_string(),
            ));
        }
        Ok(self.lock_key(name))
    }
}

fn check_ttl(ttl: Duration) -> Result<()> {
    if ttl.is_zero() {
        return Err(LockError::InvalidArgument(
            "lock ttl must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn deadline_for(ttl: Duration) -> Result<i64> {
    deadline_after(now_nanos(), ttl).ok_or_else(|| {
        LockError::InvalidArgument(format!("lock ttl {:?} is too large", ttl))
    })
}
