//! Command-line arguments and command execution

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kvlock_common::LockConfig;
use kvlock_common::config::ConfigOverrides;
use kvlock_core::{LockManager, LockStatus};
use tracing::{info, warn};

/// Exit status when a lock is held by someone else
pub const EXIT_NOT_ACQUIRED: u8 = 1;
/// Exit status for configuration, connection, and store errors
pub const EXIT_ERROR: u8 = 2;

/// Distributed locks over a shared Redis store
#[derive(Debug, Parser)]
#[command(name = "kvlock", version, about)]
pub struct Cli {
    /// Configuration file (TOML, YAML, or JSON)
    #[arg(short = 'c', long = "config", env = "KVLOCK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Store address, `host:port` or a `redis://` URL
    #[arg(short = 'a', long = "address", global = true)]
    pub address: Option<String>,

    /// Logical database index
    #[arg(short = 'd', long = "database", global = true)]
    pub database: Option<u16>,

    /// Namespace prepended to lock names
    #[arg(short = 'p', long = "prefix", global = true)]
    pub prefix: Option<String>,

    /// Per-command timeout in milliseconds
    #[arg(long = "command-timeout-ms", global = true)]
    pub command_timeout_ms: Option<u64>,

    /// Log level when RUST_LOG is unset
    #[arg(long = "log-level", env = "KVLOCK_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Try once to take a lock; exits 1 when it is held elsewhere
    Acquire {
        name: String,
        /// Lock lifetime in milliseconds
        #[arg(long = "ttl-ms", default_value_t = 30_000)]
        ttl_ms: u64,
    },
    /// Push a lock's deadline forward
    Renew {
        name: String,
        #[arg(long = "ttl-ms", default_value_t = 30_000)]
        ttl_ms: u64,
    },
    /// Delete a lock whether or not it is held
    Release { name: String },
    /// Show whether a lock is free, held, or expired
    Status {
        name: String,
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            address: self.address.clone(),
            database: self.database,
            key_prefix: self.prefix.clone(),
            connect_timeout_ms: None,
            command_timeout_ms: self.command_timeout_ms,
        }
    }

    pub fn load_config(&self) -> anyhow::Result<LockConfig> {
        LockConfig::load_with_overrides(self.config.as_deref(), &self.overrides())
            .context("failed to load configuration")
    }
}

/// Result of a command that completed without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    NotAcquired,
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Done => ExitCode::SUCCESS,
            Outcome::NotAcquired => ExitCode::from(EXIT_NOT_ACQUIRED),
        }
    }
}

/// Run one command against a connected manager.
pub async fn run(manager: &LockManager, command: &Command) -> anyhow::Result<Outcome> {
    match command {
        Command::Acquire { name, ttl_ms } => {
            let acquired = match manager.acquire(name, Duration::from_millis(*ttl_ms)).await {
                Ok(acquired) => acquired,
                Err(e) if e.lock_held() => {
                    warn!(name = %name, error = %e, "Lock acquired without a store expiry");
                    true
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to acquire lock '{}'", name));
                }
            };
            if acquired {
                info!(name = %name, ttl_ms, "Lock acquired");
                println!("acquired {}", manager.lock_key(name));
                Ok(Outcome::Done)
            } else {
                println!("held {}", manager.lock_key(name));
                Ok(Outcome::NotAcquired)
            }
        }
        Command::Renew { name, ttl_ms } => {
            match manager.renew(name, Duration::from_millis(*ttl_ms)).await {
                Ok(_) => {}
                Err(e) if e.lock_held() => {
                    warn!(name = %name, error = %e, "Lock renewed without a store expiry");
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to renew lock '{}'", name));
                }
            }
            println!("renewed {}", manager.lock_key(name));
            Ok(Outcome::Done)
        }
        Command::Release { name } => {
            manager
                .release(name)
                .await
                .with_context(|| format!("failed to release lock '{}'", name))?;
            println!("released {}", manager.lock_key(name));
            Ok(Outcome::Done)
        }
        Command::Status { name, json } => {
            let status = manager
                .status(name)
                .await
                .with_context(|| format!("failed to read lock '{}'", name))?;
            if *json {
                println!("{}", serde_json::to_string(&status)?);
            } else {
                println!("{} {}", manager.lock_key(name), describe(&status));
            }
            Ok(Outcome::Done)
        }
    }
}

/// Human-readable one-line rendering of a status
pub fn describe(status: &LockStatus) -> String {
    match status {
        LockStatus::Free => "free".to_string(),
        LockStatus::Held {
            expires_at,
            remaining,
        } => format!(
            "held until {} ({}ms left)",
            format_instant(*expires_at),
            remaining.as_millis()
        ),
        LockStatus::Expired {
            expires_at,
            overdue,
        } => format!(
            "expired at {} ({}ms ago)",
            format_instant(*expires_at),
            overdue.as_millis()
        ),
    }
}

fn format_instant(nanos: i64) -> String {
    chrono::DateTime::from_timestamp_nanos(nanos)
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_acquire_with_overrides() {
        let cli = Cli::try_parse_from([
            "kvlock",
            "--address",
            "cache:6380",
            "-p",
            "jobs",
            "acquire",
            "nightly",
            "--ttl-ms",
            "500",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.address.as_deref(), Some("cache:6380"));
        assert_eq!(overrides.key_prefix.as_deref(), Some("jobs"));
        assert!(overrides.database.is_none());
        match cli.command {
            Command::Acquire { name, ttl_ms } => {
                assert_eq!(name, "nightly");
                assert_eq!(ttl_ms, 500);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["kvlock", "status", "nightly", "--json", "-d", "3"]).unwrap();
        assert_eq!(cli.database, Some(3));
        assert!(matches!(cli.command, Command::Status { json: true, .. }));
    }

    #[test]
    fn test_describe_status() {
        assert_eq!(describe(&LockStatus::Free), "free");

        let held = LockStatus::Held {
            expires_at: 1_700_000_000_000_000_000,
            remaining: Duration::from_millis(1200),
        };
        assert_eq!(
            describe(&held),
            "held until 2023-11-14T22:13:20.000Z (1200ms left)"
        );

        let expired = LockStatus::Expired {
            expires_at: 0,
            overdue: Duration::from_millis(5),
        };
        assert_eq!(
            describe(&expired),
            "expired at 1970-01-01T00:00:00.000Z (5ms ago)"
        );
    }

    #[tokio::test]
    async fn test_run_against_memory_store() {
        use std::sync::Arc;

        use kvlock_core::{ManagerOptions, MemoryStore};

        let manager = LockManager::new(
            Arc::new(MemoryStore::new()),
            ManagerOptions::default().with_key_prefix("cli"),
        );
        let acquire = Command::Acquire {
            name: "job".to_string(),
            ttl_ms: 10_000,
        };

        assert_eq!(run(&manager, &acquire).await.unwrap(), Outcome::Done);
        assert_eq!(run(&manager, &acquire).await.unwrap(), Outcome::NotAcquired);

        let release = Command::Release {
            name: "job".to_string(),
        };
        assert_eq!(run(&manager, &release).await.unwrap(), Outcome::Done);
        assert_eq!(run(&manager, &acquire).await.unwrap(), Outcome::Done);
    }

    /// Memory store whose expiry command always fails
    #[derive(Default)]
    struct NoExpiryStore {
        inner: kvlock_core::MemoryStore,
    }

    #[async_trait::async_trait]
    impl kvlock_core::KvStore for NoExpiryStore {
        async fn set_if_absent(&self, key: &str, value: i64) -> kvlock_core::Result<bool> {
            self.inner.set_if_absent(key, value).await
        }

        async fn get(&self, key: &str) -> kvlock_core::Result<Option<i64>> {
            self.inner.get(key).await
        }

        async fn get_and_set(&self, key: &str, value: i64) -> kvlock_core::Result<Option<i64>> {
            self.inner.get_and_set(key, value).await
        }

        async fn delete(&self, key: &str) -> kvlock_core::Result<()> {
            self.inner.delete(key).await
        }

        async fn set_expiry(&self, key: &str, _ttl: Duration) -> kvlock_core::Result<()> {
            Err(kvlock_core::LockError::store(
                "set_expiry",
                key,
                anyhow::anyhow!("READONLY replica"),
            ))
        }
    }

    #[tokio::test]
    async fn test_missing_expiry_still_reports_lock_taken() {
        use std::sync::Arc;

        use kvlock_core::ManagerOptions;

        let manager = LockManager::new(
            Arc::new(NoExpiryStore::default()),
            ManagerOptions::default(),
        );
        let acquire = Command::Acquire {
            name: "job".to_string(),
            ttl_ms: 10_000,
        };

        assert_eq!(run(&manager, &acquire).await.unwrap(), Outcome::Done);
        // Our own lock now blocks a second attempt
        assert_eq!(run(&manager, &acquire).await.unwrap(), Outcome::NotAcquired);

        let renew = Command::Renew {
            name: "job".to_string(),
            ttl_ms: 10_000,
        };
        assert_eq!(run(&manager, &renew).await.unwrap(), Outcome::Done);
        assert!(manager.status("job").await.unwrap().is_held());

        let release = Command::Release {
            name: "job".to_string(),
        };
        assert_eq!(run(&manager, &release).await.unwrap(), Outcome::Done);
        assert!(!manager.status("job").await.unwrap().is_held());
    }
}
