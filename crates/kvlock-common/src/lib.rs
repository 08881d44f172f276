//! kvlock Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all kvlock components:
//! - Error taxonomy for lock and store operations
//! - Connection configuration and layered loading
//! - Lock key formatting and clock helpers

pub mod config;
pub mod error;
pub mod utils;

// Re-exports for convenience
pub use crate::config::LockConfig;
pub use crate::error::{LockError, Result};
pub use crate::utils::{deadline_after, now_nanos, prefixed_key};

/// Separator placed between the key prefix and the lock name
pub const KEY_SEPARATOR: &str = ":";

/// Environment variable prefix used by configuration loading
pub const ENV_PREFIX: &str = "KVLOCK";
