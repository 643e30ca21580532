//! Daily reward cycle
//!
//! Claim the position's pending rewards, then either send the raw reward
//! tokens to the reward wallet or swap them and forward the stable proceeds.
//! Nothing in here fails the cycle: every problem is logged and reported.

use crate::domain::Position;
use crate::infrastructure::client::{
    ChainGateway, ClaimOutcome, SwapRoute, TradeOutcome, TransferOutcome,
};
use crate::infrastructure::config::RewardMode;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardStep {
    /// Not attempted
    Skipped,
    /// Nothing to do (zero pending or zero balance)
    Nothing,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardReport {
    pub claim: RewardStep,
    /// Pending rewards claimed, whole tokens
    pub claimed: f64,
    pub disposal: RewardStep,
}

pub async fn claim_and_dispose(
    gateway: &dyn ChainGateway,
    mode: RewardMode,
    position: &Position,
) -> RewardReport {
    let (claim, claimed) = match gateway.claim_rewards(position).await {
        Ok(ClaimOutcome::Claimed { pending, .. }) => {
            info!("[Rewards] Claimed {} for bin {}", pending, position.bin_id);
            (RewardStep::Done, pending)
        }
        Ok(ClaimOutcome::NothingToClaim) => (RewardStep::Nothing, 0.0),
        Err(e) => {
            warn!("[Rewards] Daily claim failed: {}", e);
            return RewardReport {
                claim: RewardStep::Failed,
                claimed: 0.0,
                disposal: RewardStep::Skipped,
            };
        }
    };

    // Leftovers from earlier cycles are disposed of even when nothing was claimed now
    let disposal = match mode {
        RewardMode::Transfer => transfer(gateway).await,
        RewardMode::Trade => trade_and_forward(gateway).await,
    };

    RewardReport {
        claim,
        claimed,
        disposal,
    }
}

async fn transfer(gateway: &dyn ChainGateway) -> RewardStep {
    match gateway.transfer_rewards().await {
        Ok(TransferOutcome::Transferred { raw, .. }) => {
            info!("[Rewards] Transferred {} raw reward units", raw);
            RewardStep::Done
        }
        Ok(TransferOutcome::NothingToTransfer) => RewardStep::Nothing,
        Err(e) => {
            warn!("[Rewards] Reward transfer failed: {}", e);
            RewardStep::Failed
        }
    }
}

async fn trade_and_forward(gateway: &dyn ChainGateway) -> RewardStep {
    match gateway.trade_rewards().await {
        Ok(TradeOutcome::Swapped {
            route: SwapRoute::ToStable,
            received,
            output_token,
            ..
        }) => match gateway.transfer_tokens(output_token, received).await {
            Ok(_) => RewardStep::Done,
            Err(e) => {
                warn!("[Rewards] Forwarding swap proceeds failed: {}", e);
                RewardStep::Failed
            }
        },
        Ok(TradeOutcome::Swapped {
            route: SwapRoute::ToNative,
            ..
        }) => {
            info!("[Rewards] Gas balance low, kept native proceeds for gas");
            RewardStep::Done
        }
        Ok(TradeOutcome::NothingToTrade) => RewardStep::Nothing,
        Err(e) => {
            warn!("[Rewards] Reward trade failed: {}", e);
            RewardStep::Failed
        }
    }
}
