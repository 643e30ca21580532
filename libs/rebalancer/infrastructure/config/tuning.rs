//! Operational tunables (YAML)

use super::{ConfigError, Result};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Router path description for one swap route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHops {
    /// Bin step of each hop (0 selects a constant-product pool)
    pub bin_steps: Vec<u64>,
    /// Liquidity book version of each hop
    pub versions: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Address the HTTP trigger binds to (PORT env overrides the port)
    pub listen_addr: String,
    /// Time budget for a single RPC or HTTP round-trip
    pub rpc_timeout_secs: u64,
    /// Time budget for a transaction receipt
    pub receipt_timeout_secs: u64,
    /// Extra attempts for transient network failures
    pub max_retries: u32,
    /// Lifetime of the per-pair cycle lease
    pub lease_ttl_secs: u64,
    /// Keep state in a local directory instead of the bucket
    pub state_dir: Option<PathBuf>,
    /// Wrapped native token of the network
    pub native_token: Address,
    /// Stable token that reward trades settle in
    pub stable_token: Address,
    /// Native balance (whole units) at or below which trades top up gas instead
    pub low_gas_threshold: f64,
    /// Minimum raw output accepted by reward swaps
    pub swap_min_out: u64,
    /// Cap (whole reward tokens) on a gas top-up swap; `null` trades the full balance
    pub low_gas_swap_cap: Option<f64>,
    /// Reward -> native -> stable
    pub stable_route: RouteHops,
    /// Reward -> native
    pub native_route: RouteHops,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            listen_addr: "0.0.0.0:8080".to_string(),
            rpc_timeout_secs: 30,
            receipt_timeout_secs: 300,
            max_retries: 1,
            lease_ttl_secs: 900,
            state_dir: None,
            // Sonic wS and USDC.e
            native_token: Address::from_slice(&[
                0x03, 0x9e, 0x2f, 0xb6, 0x61, 0x02, 0x31, 0x4c, 0xe7, 0xb6, 0x4c, 0xe5, 0xce, 0x3e,
                0x51, 0x83, 0xbc, 0x94, 0xad, 0x38,
            ]),
            stable_token: Address::from_slice(&[
                0x29, 0x21, 0x9d, 0xd4, 0x00, 0xf2, 0xbf, 0x60, 0xe5, 0xa2, 0x3d, 0x13, 0xbe, 0x72,
                0xb4, 0x86, 0xd4, 0x03, 0x88, 0x94,
            ]),
            low_gas_threshold: 5.0,
            swap_min_out: 1,
            low_gas_swap_cap: Some(50.0),
            stable_route: RouteHops {
                bin_steps: vec![0, 4],
                versions: vec![0, 2],
            },
            native_route: RouteHops {
                bin_steps: vec![0],
                versions: vec![0],
            },
        }
    }
}

impl TuningConfig {
    /// Load from YAML, falling back to defaults when the file does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("Tuning file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        info!("Loading tuning from {:?}", path);
        let yaml_content = std::fs::read_to_string(path)?;
        let config: TuningConfig = serde_yaml::from_str(&yaml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }
        if self.rpc_timeout_secs == 0 || self.receipt_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than 0".to_string(),
            ));
        }
        if self.lease_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "lease_ttl_secs must be greater than 0".to_string(),
            ));
        }
        for (name, route) in [("stable_route", &self.stable_route), ("native_route", &self.native_route)] {
            if route.bin_steps.is_empty() || route.bin_steps.len() != route.versions.len() {
                return Err(ConfigError::ValidationError(format!(
                    "{} needs one bin step and one version per hop",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}
