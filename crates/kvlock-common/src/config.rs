//! Connection configuration for kvlock
//!
//! Configuration is layered: built-in defaults, an optional file, `KVLOCK_*`
//! environment variables, then explicit overrides (usually CLI flags).

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ENV_PREFIX;
use crate::error::{LockError, Result};

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:6379";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_POOL_SIZE: usize = 16;

const URL_SCHEMES: &[&str] = &["redis://", "rediss://", "redis+unix://", "unix://"];

/// Store connection configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Store location, `host:port` or a full `redis://` URL
    pub address: String,
    /// Logical database index
    pub database: u16,
    /// Max wait for creating or borrowing a connection, in milliseconds
    pub connect_timeout_ms: u64,
    /// Max wait for a single store round-trip, in milliseconds
    pub command_timeout_ms: u64,
    /// Namespace prepended to every lock key (empty for none)
    pub key_prefix: String,
    /// Maximum number of pooled connections
    pub pool_size: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            database: 0,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            key_prefix: String::new(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Values that take precedence over every other configuration source
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub address: Option<String>,
    pub database: Option<u16>,
    pub key_prefix: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub command_timeout_ms: Option<u64>,
}

impl LockConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_database(mut self, database: u16) -> Self {
        self.database = database;
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub fn with_timeouts(mut self, connect_timeout_ms: u64, command_timeout_ms: u64) -> Self {
        self.connect_timeout_ms = connect_timeout_ms;
        self.command_timeout_ms = command_timeout_ms;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Load from an optional file and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_with_overrides(file, &ConfigOverrides::default())
    }

    /// Load from an optional file and the environment, then apply `overrides`.
    pub fn load_with_overrides(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .set_override_option("address", overrides.address.clone())
            .and_then(|b| b.set_override_option("database", overrides.database.map(i64::from)))
            .and_then(|b| b.set_override_option("key_prefix", overrides.key_prefix.clone()))
            .and_then(|b| {
                b.set_override_option(
                    "connect_timeout_ms",
                    overrides.connect_timeout_ms.map(saturating_i64),
                )
            })
            .and_then(|b| {
                b.set_override_option(
                    "command_timeout_ms",
                    overrides.command_timeout_ms.map(saturating_i64),
                )
            })
            .map_err(|e| LockError::Configuration(e.to_string()))?;

        let config: LockConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| LockError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject parameters no connection can be built from.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(LockError::Configuration(
                "address must not be empty".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(LockError::Configuration(
                "connect_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.command_timeout_ms == 0 {
            return Err(LockError::Configuration(
                "command_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(LockError::Configuration(
                "pool_size must be greater than zero".to_string(),
            ));
        }
        if self.key_prefix.chars().any(char::is_whitespace) {
            return Err(LockError::Configuration(format!(
                "key_prefix '{}' must not contain whitespace",
                self.key_prefix
            )));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Connection URL for the store.
    ///
    /// A bare `host:port` becomes `redis://host:port/<database>`. A URL without
    /// a database path gets `/<database>` appended; one with a path is kept.
    pub fn connection_url(&self) -> String {
        let address = self.address.trim();
        match URL_SCHEMES.iter().find(|s| address.starts_with(**s)) {
            Some(scheme) => {
                let rest = &address[scheme.len()..];
                if rest.contains('/') || scheme.contains("unix") {
                    address.to_string()
                } else {
                    format!("{}/{}", address, self.database)
                }
            }
            None => format!("redis://{}/{}", address, self.database),
        }
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
