//! Infrastructure Layer
//!
//! Chain gateway, state storage, cloud clients and process plumbing.

pub mod client;
pub mod config;
pub mod halt;
pub mod logging;
pub mod retry;
pub mod storage;

pub use client::{ChainGateway, GatewayError, LbGateway};
pub use config::{AgentConfig, ConfigError, RewardMode, TuningConfig};
pub use halt::{EmergencyHalt, EmergencyStop, HaltError, HaltReport};
pub use logging::init_tracing;
pub use retry::{with_retry, CallPolicy, Transient};
pub use storage::{
    CycleLease, DirectoryStateStore, GcsStateStore, LeaseError, MemoryStateStore, PairState,
    StateStore, StorageError, Versioned,
};
