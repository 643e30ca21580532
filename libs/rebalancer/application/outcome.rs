//! Cycle results and the response envelope

use super::rewards::RewardReport;
use crate::domain::{Position, PriceAssessment};
use crate::infrastructure::client::{GatewayError, RemovalOutcome};
use crate::infrastructure::retry::Transient;
use crate::infrastructure::storage::StorageError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Failed to connect to the RPC endpoint")]
    Connectivity,

    #[error("Failed to read pool state: {0}")]
    Read(#[source] GatewayError),

    #[error("Cycle for {prefix} already in progress (holder {holder})")]
    Busy { prefix: String, holder: String },

    #[error("Failed to acquire cycle lease: {0}")]
    Lease(#[source] StorageError),

    #[error("Failed to remove liquidity: {0}")]
    RemoveFailed(#[source] GatewayError),

    #[error("Failed to add liquidity: {0}")]
    AddFailed(String),

    #[error("Failed to add initial liquidity: {0}")]
    BootstrapFailed(String),
}

pub type CycleResult<T> = std::result::Result<T, CycleError>;

impl CycleError {
    /// Short machine-readable name for the response body
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::Connectivity => "connectivity",
            CycleError::Read(_) => "read",
            CycleError::Busy { .. } => "busy",
            CycleError::Lease(_) => "storage",
            CycleError::RemoveFailed(_) => "remove_liquidity",
            CycleError::AddFailed(_) => "add_liquidity",
            CycleError::BootstrapFailed(_) => "initial_deposit",
        }
    }

    /// Whether the node (not the contracts) was the problem
    pub fn is_connectivity(&self) -> bool {
        match self {
            CycleError::Connectivity => true,
            CycleError::Read(e) => e.is_transient(),
            _ => false,
        }
    }

    pub fn to_response(&self) -> CycleResponse {
        CycleResponse {
            status: ResponseStatus::Error,
            message: self.to_string(),
            data: json!({ "kind": self.kind() }),
        }
    }
}

/// Why a cycle left liquidity where it was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoActionReason {
    OutOfLimits,
    ExcessiveChange,
    PriceUnchanged,
}

impl NoActionReason {
    pub fn message(&self) -> &'static str {
        match self {
            NoActionReason::OutOfLimits => "Price out of limits",
            NoActionReason::ExcessiveChange => "Price change exceeds maximum",
            NoActionReason::PriceUnchanged => "Position exists, no price change",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Liquidity moved from `previous_bin` to the new position
    Rebalanced {
        prefix: String,
        position: Position,
        previous_bin: u32,
        removal: RemovalOutcome,
        assessment: PriceAssessment,
        rewards: Option<RewardReport>,
    },
    /// Initial deposit (first run, or no valid position on record)
    Deposited {
        prefix: String,
        position: Position,
        first_run: bool,
        assessment: PriceAssessment,
    },
    NoAction {
        prefix: String,
        reason: NoActionReason,
        assessment: PriceAssessment,
        rewards: Option<RewardReport>,
    },
}

impl CycleOutcome {
    pub fn prefix(&self) -> &str {
        match self {
            CycleOutcome::Rebalanced { prefix, .. }
            | CycleOutcome::Deposited { prefix, .. }
            | CycleOutcome::NoAction { prefix, .. } => prefix,
        }
    }

    /// New position, if this cycle opened one
    pub fn position(&self) -> Option<&Position> {
        match self {
            CycleOutcome::Rebalanced { position, .. } | CycleOutcome::Deposited { position, .. } => {
                Some(position)
            }
            CycleOutcome::NoAction { .. } => None,
        }
    }

    pub fn to_response(&self) -> CycleResponse {
        match self {
            CycleOutcome::Rebalanced {
                prefix,
                position,
                previous_bin,
                removal,
                assessment,
                rewards,
            } => {
                let removed_shares = match removal {
                    RemovalOutcome::Removed { shares, .. } => Some(shares.to_string()),
                    RemovalOutcome::NothingToRemove => None,
                };
                CycleResponse {
                    status: ResponseStatus::Success,
                    message: format!("Liquidity moved from bin {} to bin {}", previous_bin, position.bin_id),
                    data: json!({
                        "prefix": prefix,
                        "position": position,
                        "previous_bin": previous_bin,
                        "removed_shares": removed_shares,
                        "price": assessment,
                        "rewards": rewards,
                    }),
                }
            }
            CycleOutcome::Deposited {
                prefix,
                position,
                first_run,
                assessment,
            } => CycleResponse {
                status: ResponseStatus::Success,
                message: format!("Initial liquidity added at bin {}", position.bin_id),
                data: json!({
                    "prefix": prefix,
                    "position": position,
                    "first_run": first_run,
                    "price": assessment,
                }),
            },
            CycleOutcome::NoAction {
                prefix,
                reason,
                assessment,
                rewards,
            } => {
                let mut data = serde_json::to_value(assessment).unwrap_or_else(|_| json!({}));
                if let Value::Object(fields) = &mut data {
                    fields.insert("prefix".to_string(), json!(prefix));
                    fields.insert("reason".to_string(), json!(reason));
                    fields.insert("rewards".to_string(), json!(rewards));
                }
                CycleResponse {
                    status: ResponseStatus::NoAction,
                    message: reason.message().to_string(),
                    data,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    NoAction,
    Error,
}

/// Body returned to the trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResponse {
    pub status: ResponseStatus,
    pub message: String,
    pub data: Value,
}

impl From<&CycleResult<CycleOutcome>> for CycleResponse {
    fn from(result: &CycleResult<CycleOutcome>) -> Self {
        match result {
            Ok(outcome) => outcome.to_response(),
            Err(e) => e.to_response(),
        }
    }
}
