//! Redis-backed store over a `deadpool-redis` connection pool
//!
//! Every operation borrows one pooled connection for a single command and
//! returns it afterwards. Command mapping:
//!
//! | operation       | command   |
//! |-----------------|-----------|
//! | `set_if_absent` | `SETNX`   |
//! | `get`           | `GET`     |
//! | `get_and_set`   | `GETSET`  |
//! | `delete`        | `DEL`     |
//! | `set_expiry`    | `PEXPIRE` |

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{FromRedisValue, cmd};
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime, Timeouts};
use kvlock_common::{LockConfig, LockError, Result};
use tracing::{debug, info, warn};

use super::KvStore;

/// Pooled Redis connection handle
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("RedisStore")
            .field("max_size", &status.max_size)
            .field("size", &status.size)
            .field("available", &status.available)
            .finish()
    }
}

impl RedisStore {
    /// Build a pool from `config` and verify it with one `PING`.
    pub async fn connect(config: &LockConfig) -> Result<Self> {
        config.validate()?;

        let connect_timeout = config.connect_timeout();
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts = Timeouts {
            wait: Some(connect_timeout),
            create: Some(connect_timeout),
            recycle: Some(connect_timeout),
        };

        let mut redis_config = Config::from_url(config.connection_url());
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| {
                LockError::Configuration(format!(
                    "invalid store address '{}': {}",
                    config.address, e
                ))
            })?;

        let store = Self { pool };
        store.ping(connect_timeout).await?;

        info!(
            address = %config.address,
            database = config.database,
            pool_size = config.pool_size,
            "Connected to lock store"
        );
        Ok(store)
    }

    /// Wrap an existing pool without checking connectivity.
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    async fn ping(&self, timeout: Duration) -> Result<()> {
        let probe = async {
            let mut conn = self.connection().await?;
            let _pong: String = cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| LockError::connection("store did not answer PING", e))?;
            Ok::<(), LockError>(())
        };

        match tokio::time::timeout(timeout, probe).await {
            Ok(result) => result,
            Err(elapsed) => Err(LockError::connection(
                format!("no usable store connection within {:?}", timeout),
                elapsed,
            )),
        }
    }

    async fn connection(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| LockError::connection("failed to borrow a store connection", e))
    }

    async fn run<T: FromRedisValue>(
        &self,
        command: &'static str,
        key: &str,
        request: &deadpool_redis::redis::Cmd,
    ) -> Result<T> {
        let mut conn = self.connection().await?;
        let value: T = request
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::store(command, key, e))?;
        Ok(value)
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: i64) -> Result<bool> {
        self.run("SETNX", key, cmd("SETNX").arg(key).arg(value)).await
    }

    async fn get(&self, key: &str) -> Result<Option<i64>> {
        self.run("GET", key, cmd("GET").arg(key)).await
    }

    async fn get_and_set(&self, key: &str, value: i64) -> Result<Option<i64>> {
        self.run("GETSET", key, cmd("GETSET").arg(key).arg(value)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let removed: i64 = self.run("DEL", key, cmd("DEL").arg(key)).await?;
        debug!(key, removed, "Deleted lock key");
        Ok(())
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
        // Sub-millisecond TTLs would round to zero and delete the key at once.
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1);
        let applied: i64 = self
            .run("PEXPIRE", key, cmd("PEXPIRE").arg(key).arg(millis))
            .await?;
        if applied == 0 {
            warn!(key, "Lock key vanished before its expiry could be set");
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close();
        info!("Closed lock store connection pool");
        Ok(())
    }
}
