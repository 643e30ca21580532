//! Liquidity Book rebalancing agent
//!
//! Keeps a single-bin position on one pair centred on the active price,
//! claims and redistributes rewards daily, and halts its own scheduler after
//! repeated failures.

pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used items
pub use application::{
    build_engine, AgentContext, CycleError, CycleOutcome, CycleResponse, CycleSettings,
    RebalanceEngine, ResponseStatus, TriggerServer,
};
pub use domain::{Position, PriceAssessment, PriceLimits, PriceObservation};
pub use infrastructure::{init_tracing, AgentConfig, ChainGateway, EmergencyHalt, StateStore};
