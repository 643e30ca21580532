//! Metro DLMM Rebalancer - Main Library
//!
//! Binaries live in `src/bin`; the agent itself is the `rebalancer`
//! workspace library, re-exported here.
//!
//! ## Usage in Binaries
//!
//! ```rust,no_run
//! use metro_dlmm_rebalancer::bin_common::load_config_from_env;
//! use metro_dlmm_rebalancer::rebalancer::AgentConfig;
//!
//! let config = AgentConfig::load(load_config_from_env()).unwrap();
//! ```

pub use rebalancer;

// Binary common utilities
pub mod bin_common {
    //! Shared startup code for the binaries

    pub mod cli;
    pub mod runner;

    pub use cli::{load_config_from_env, resolve_listen_addr, CONFIG_PATH_VAR, DEFAULT_CONFIG_PATH};
    pub use runner::{load_agent, print_banner, print_shutdown};
}
