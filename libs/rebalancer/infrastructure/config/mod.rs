//! Agent configuration
//!
//! Required settings (contracts, keys, limits, cloud identifiers) come from the
//! environment, optionally seeded from a `.env` file. Operational tunables come
//! from an optional YAML file where every field has a default.

pub mod tuning;

use crate::domain::PriceLimits;
use ethers::types::Address;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

pub use tuning::{RouteHops, TuningConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Value that must never end up in logs
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// What to do with claimed reward tokens (`REWARD_CONF`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardMode {
    /// 0: send the raw reward tokens to the reward wallet
    Transfer,
    /// 1: swap through the router and forward the proceeds
    Trade,
}

impl FromStr for RewardMode {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim() {
            "0" => Ok(RewardMode::Transfer),
            "1" => Ok(RewardMode::Trade),
            _ => Err(format!("expected 0 or 1, got '{}'", raw)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    /// Liquidity book pair
    pub lb_pair: Address,
    /// Liquidity book router
    pub lb_router: Address,
    /// Pair rewarder (hooks) contract
    pub rewarder: Address,
    pub private_key: Secret,
}

#[derive(Debug, Clone)]
pub struct RewardConfig {
    pub mode: RewardMode,
    pub reward_wallet: Address,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub project_id: String,
    pub location: String,
    pub job_name: String,
}

impl SchedulerConfig {
    /// Fully qualified Cloud Scheduler job name
    pub fn job_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/jobs/{}",
            self.project_id, self.location, self.job_name
        )
    }
}

#[derive(Debug, Clone)]
pub struct PushoverConfig {
    pub token: Secret,
    pub user: Secret,
}

/// Complete agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub chain: ChainConfig,
    pub rewards: RewardConfig,
    pub limits: PriceLimits,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub pushover: PushoverConfig,
    pub tuning: TuningConfig,
}

impl AgentConfig {
    /// Load tunables from `tuning_path` (if present) and the rest from the environment
    pub fn load(tuning_path: impl AsRef<Path>) -> Result<Self> {
        dotenv::dotenv().ok(); // Don't fail if .env doesn't exist

        let tuning = TuningConfig::load_or_default(tuning_path)?;
        Self::from_lookup(|name| std::env::var(name).ok(), tuning)
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F, tuning: TuningConfig) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource { lookup };

        let config = Self {
            chain: ChainConfig {
                rpc_url: env.required("RPC_URL")?,
                lb_pair: env.parsed("LBP_CA")?,
                lb_router: env.parsed("LBROUTER_CA")?,
                rewarder: env.parsed("REWARDER_CA")?,
                private_key: Secret::new(env.required("PRIVATE_KEY")?),
            },
            rewards: RewardConfig {
                mode: env.parsed("REWARD_CONF")?,
                reward_wallet: env.parsed("REWARD_WALLET")?,
            },
            limits: PriceLimits {
                lower: env.parsed("LOWER_LIM")?,
                upper: env.parsed("UPPER_LIM")?,
                max_change_pct: env.parsed("MAX_CHANGE")?,
            },
            storage: StorageConfig {
                bucket: env.required("BUCKET_NAME")?,
            },
            scheduler: SchedulerConfig {
                project_id: env.required("PROJECT_ID")?,
                location: env.required("SCHEDULER_LOCATION")?,
                job_name: env.required("SCHEDULER_JOB_NAME")?,
            },
            pushover: PushoverConfig {
                token: Secret::new(env.required("PUSHOVER_TOKEN")?),
                user: Secret::new(env.required("PUSHOVER_USER")?),
            },
            tuning,
        };

        config.validate()?;
        Ok(config)
    }

    /// Build from an in-memory map of variables
    pub fn from_map(vars: &HashMap<String, String>, tuning: TuningConfig) -> Result<Self> {
        Self::from_lookup(|name| vars.get(name).cloned(), tuning)
    }

    fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if !(limits.lower >= 0.0) {
            return Err(ConfigError::ValidationError(
                "LOWER_LIM must be a non-negative number".to_string(),
            ));
        }
        if !(limits.upper > limits.lower) {
            return Err(ConfigError::ValidationError(
                "UPPER_LIM must be greater than LOWER_LIM".to_string(),
            ));
        }
        if !(limits.max_change_pct > 0.0) {
            return Err(ConfigError::ValidationError(
                "MAX_CHANGE must be greater than 0".to_string(),
            ));
        }

        // 64 hex characters, optionally 0x-prefixed
        let key = self.chain.private_key.expose().trim_start_matches("0x");
        if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::ValidationError(
                "PRIVATE_KEY must be a valid hex string (64 hex characters, optional 0x prefix)"
                    .to_string(),
            ));
        }

        if self.storage.bucket.trim().is_empty() && self.tuning.state_dir.is_none() {
            return Err(ConfigError::ValidationError(
                "BUCKET_NAME cannot be empty".to_string(),
            ));
        }

        self.tuning.validate()
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  RPC: {}", self.chain.rpc_url);
        info!("  Pair: {:?}", self.chain.lb_pair);
        info!("  Router: {:?}", self.chain.lb_router);
        info!("  Rewarder: {:?}", self.chain.rewarder);
        info!("  Reward mode: {:?} -> {:?}", self.rewards.mode, self.rewards.reward_wallet);
        info!(
            "  Price band: ({}, {}), max change {}%",
            self.limits.lower, self.limits.upper, self.limits.max_change_pct
        );
        match &self.tuning.state_dir {
            Some(dir) => info!("  State: directory {:?}", dir),
            None => info!("  State: bucket {}", self.storage.bucket),
        }
        info!("  Scheduler job: {}", self.scheduler.job_path());
        info!("  Log level: {}", self.tuning.log_level);
    }
}

struct EnvSource<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    fn required(&self, name: &str) -> Result<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ConfigError::EnvVarMissing(name.to_string()))
    }

    fn parsed<T>(&self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.required(name)?
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }
}
