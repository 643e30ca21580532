//! Application Layer
//!
//! The rebalancing cycle, failure escalation and the HTTP trigger.
//! This layer depends on domain and infrastructure layers.

pub mod engine;
pub mod escalation;
pub mod facade;
pub mod outcome;
pub mod rewards;
pub mod server;

pub use engine::{AgentContext, CycleSettings, RebalanceEngine};
pub use escalation::{FailureEscalation, FAILURE_THRESHOLD};
pub use facade::build_engine;
pub use outcome::{
    CycleError, CycleOutcome, CycleResponse, CycleResult, NoActionReason, ResponseStatus,
};
pub use rewards::{claim_and_dispose, RewardReport, RewardStep};
pub use server::{status_code, TriggerServer};
