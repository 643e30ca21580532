//! Startup and shutdown helpers shared by the binaries

use super::cli::load_config_from_env;
use anyhow::{Context, Result};
use rebalancer::{init_tracing, AgentConfig};
use tracing::info;

/// Load configuration, start logging and log the summary
pub fn load_agent() -> Result<AgentConfig> {
    let path = load_config_from_env();
    let config = AgentConfig::load(&path)
        .with_context(|| format!("loading configuration (tuning file {:?})", path))?;

    init_tracing(&config.tuning.log_level);
    config.log();
    Ok(config)
}

pub fn print_banner(name: &str, detail: &str) {
    info!("");
    info!("========================================");
    info!("Starting {}", name);
    info!("{}", detail);
    info!("========================================");
    info!("");
}

pub fn print_shutdown(name: &str) {
    info!("");
    info!("========================================");
    info!("{} stopped gracefully", name);
    info!("========================================");
}
