//! Tracing setup for the sbfoods binary
//!
//! Usage:
//!   sbfoods serve                     # info level
//!   sbfoods --debug serve             # debug level
//!   RUST_LOG=sbfoods_server=trace ... # fine-grained control, wins over --debug

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Tracing configuration options
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Debug logging unless RUST_LOG is set
    pub debug: bool,
}

/// Install the console subscriber
pub fn init(config: &TracingConfig) -> Result<()> {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.debug)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}
