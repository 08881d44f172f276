//! Error types for kvlock
//!
//! A lock operation either returns a definite answer (`Ok(true)` / `Ok(false)`)
//! or one of these errors. An error never means "acquired", with the single
//! exception of [`LockError::ExpiryNotSet`], see [`LockError::lock_held`].

use std::time::Duration;

/// Errors raised by lock managers and key-value stores
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("store command {command} failed for key '{key}': {source}")]
    Store {
        command: &'static str,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("store command {command} timed out after {timeout:?} for key '{key}'")]
    Timeout {
        command: &'static str,
        key: String,
        timeout: Duration,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("lock '{key}' is held but its store expiry could not be set: {source}")]
    ExpiryNotSet {
        key: String,
        #[source]
        source: Box<LockError>,
    },
}

pub type Result<T> = std::result::Result<T, LockError>;

impl LockError {
    pub fn connection(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        LockError::Connection {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn store(
        command: &'static str,
        key: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        LockError::Store {
            command,
            key: key.into(),
            source: source.into(),
        }
    }

    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        match self {
            LockError::Connection { .. } | LockError::Store { .. } | LockError::Timeout { .. } => {
                true
            }
            LockError::ExpiryNotSet { .. }
            | LockError::Configuration(_)
            | LockError::InvalidArgument(_) => false,
        }
    }

    /// Whether the lock is held by the caller despite the error.
    ///
    /// Only true for [`LockError::ExpiryNotSet`]: the value deadline was
    /// written and the caller won, but the store-level TTL backstop is missing.
    pub fn lock_held(&self) -> bool {
        matches!(self, LockError::ExpiryNotSet { .. })
    }

    /// Store command name for command-scoped errors.
    pub fn command(&self) -> Option<&'static str> {
        match self {
            LockError::Store { command, .. } | LockError::Timeout { command, .. } => Some(*command),
            LockError::ExpiryNotSet { source, .. } => source.command(),
            _ => None,
        }
    }
}
