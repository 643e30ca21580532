//! Chain Gateway
//!
//! Everything a cycle needs from the chain, behind one trait so the engine
//! can run against a fake in tests. Reads may be retried once on transient
//! failures; transaction submissions never are.

use crate::domain::Position;
use crate::infrastructure::retry::Transient;
use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("RPC unreachable: {0}")]
    Connectivity(String),

    #[error("Contract read failed: {0}")]
    Read(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Approval failed: {0}")]
    ApprovalFailed(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("{0} timed out")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl Transient for GatewayError {
    fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Connectivity(_) | GatewayError::Timeout(_))
    }

    fn timed_out(operation: &str, after: Duration) -> Self {
        GatewayError::Timeout(format!("{} after {:?}", operation, after))
    }
}

/// ERC-20 or native balance of the agent wallet
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalance {
    pub symbol: String,
    pub decimals: u8,
    pub raw: U256,
    /// Whole-token units
    pub amount: f64,
}

/// Live pool price
#[derive(Debug, Clone, PartialEq)]
pub struct PoolPrice {
    /// Token Y per token X
    pub price: f64,
    pub active_id: u32,
    pub token_x: Address,
    pub token_y: Address,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemovalOutcome {
    Removed { tx_hash: TxHash, bin_id: u32, shares: U256 },
    /// The wallet holds no shares in the bin; nothing was sent
    NothingToRemove,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed { tx_hash: TxHash, pending: f64 },
    NothingToClaim,
}

/// Which router path a reward swap took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapRoute {
    /// reward -> native -> stable; proceeds belong to the reward wallet
    ToStable,
    /// reward -> native; proceeds stay in the agent wallet as gas
    ToNative,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TradeOutcome {
    Swapped {
        tx_hash: TxHash,
        route: SwapRoute,
        amount_in: f64,
        /// Raw amount of the output token the wallet gained
        received: U256,
        output_token: Address,
    },
    NothingToTrade,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Transferred {
        tx_hash: TxHash,
        token: Address,
        raw: U256,
    },
    NothingToTransfer,
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Whether the RPC endpoint answers
    async fn is_connected(&self) -> bool;

    /// Symbols of token X and token Y of the managed pair
    async fn pair_symbols(&self) -> Result<(String, String)>;

    async fn current_price(&self) -> Result<PoolPrice>;

    /// Deposit into the active bin; `None` when either side has no balance
    async fn add_liquidity(&self) -> Result<Option<Position>>;

    /// Withdraw all of the wallet's shares in the position's bin
    async fn remove_liquidity(&self, position: &Position) -> Result<RemovalOutcome>;

    async fn claim_rewards(&self, position: &Position) -> Result<ClaimOutcome>;

    /// Swap the wallet's whole reward balance through the router
    async fn trade_rewards(&self) -> Result<TradeOutcome>;

    /// Send the wallet's whole reward balance to the reward wallet
    async fn transfer_rewards(&self) -> Result<TransferOutcome>;

    /// Send `amount` of `token` to the reward wallet
    async fn transfer_tokens(&self, token: Address, amount: U256) -> Result<TransferOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_are_transient() {
        assert!(GatewayError::Connectivity("reset".into()).is_transient());
        assert!(GatewayError::timed_out("getActiveId", Duration::from_secs(30)).is_transient());
        assert!(!GatewayError::Read("revert".into()).is_transient());
        assert!(!GatewayError::TransactionFailed("status 0".into()).is_transient());
    }
}
