//! Logging setup for hosts embedding the controllers
use tracing::Level;

use crate::config::ClientConfig;

/// Installs a global fmt subscriber. Fails if one is already installed.
pub fn init(level: Level) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

pub fn init_from_config(config: &ClientConfig) -> anyhow::Result<()> {
    init(config.log_level)
}
