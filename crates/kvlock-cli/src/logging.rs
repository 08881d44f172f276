//! Console logging for the command-line client
//!
//! Log output goes to stderr so command results on stdout stay scriptable.
//! `RUST_LOG` takes precedence over the configured level.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Logging configuration for the client
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Console log level when `RUST_LOG` is unset
    pub level: Level,
    /// Include event targets (module paths) in each line
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            with_target: false,
        }
    }
}

impl LoggingConfig {
    /// Build from an optional level name such as `debug`; unknown names fall back to the default.
    pub fn from_level(level: Option<&str>) -> Self {
        let level = level
            .and_then(|v| v.parse().ok())
            .unwrap_or(Level::WARN);
        Self {
            level,
            with_target: level >= Level::DEBUG,
        }
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.with_target)
        .with_filter(filter);

    Registry::default().with(console_layer).try_init()?;
    Ok(())
}
