//! Main entry point for the kvlock command-line client.
//!
//! Loads configuration, connects to the lock store, runs one command, and
//! closes the connection pool before exiting.

mod cli;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use crate::cli::{Cli, EXIT_ERROR};
use crate::logging::{LoggingConfig, init_logging};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    if let Err(e) = init_logging(&LoggingConfig::from_level(args.log_level.as_deref())) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    kvlock_core::init_metrics();

    match execute(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn execute(args: &Cli) -> anyhow::Result<ExitCode> {
    let config = args.load_config()?;
    debug!(address = %config.address, database = config.database, "Loaded configuration");

    let manager = kvlock_core::LockManager::connect(&config).await?;
    let outcome = cli::run(&manager, &args.command).await;
    manager.close().await?;

    Ok(outcome?.exit_code())
}
