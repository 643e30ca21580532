//! Configuration path and listen address resolution

use std::path::PathBuf;

/// Environment variable naming the tuning file
pub const CONFIG_PATH_VAR: &str = "REBALANCER_CONFIG_PATH";

pub const DEFAULT_CONFIG_PATH: &str = "config/rebalancer.yaml";

/// Tuning file path from the environment, or the default
pub fn load_config_from_env() -> PathBuf {
    std::env::var(CONFIG_PATH_VAR)
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
        .into()
}

/// Apply a `PORT` override (as set by container platforms) to the configured address
///
/// The host part of `configured` is kept. An empty or non-numeric port is ignored.
pub fn resolve_listen_addr(configured: &str, port: Option<&str>) -> String {
    let port = match port.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) if p.parse::<u16>().is_ok() => p,
        _ => return configured.to_string(),
    };

    let host = match configured.rsplit_once(':') {
        Some((host, _)) if !host.is_empty() => host,
        _ => "0.0.0.0",
    };
    format!("{}:{}", host, port)
}
