//! Rebalancing cycle
//!
//! One call to [`RebalanceEngine::run_cycle`] per external trigger:
//!
//! 1. check connectivity and resolve the pair prefix
//! 2. take the pair's cycle lease
//! 3. stamp the operational timestamp, detect a new calendar day
//! 4. read the previous price, query the live one (first run persists it)
//! 5. stop unless the price is inside the band and moved less than the limit
//! 6. manage the existing position, or deposit a new one
//!
//! Only remove/add failures count towards escalation. Reward failures are
//! logged and the cycle carries on.

use super::escalation::FailureEscalation;
use super::outcome::{CycleError, CycleOutcome, CycleResult, NoActionReason};
use super::rewards::claim_and_dispose;
use crate::domain::{
    crossed_day_boundary, pair_prefix, OperationalTimestamp, Position, PriceAssessment,
    PriceLimits, PriceObservation, StateFile, StoredPosition, UNKNOWN_PREFIX,
};
use crate::infrastructure::client::{ChainGateway, RemovalOutcome};
use crate::infrastructure::config::{AgentConfig, RewardMode};
use crate::infrastructure::halt::EmergencyHalt;
use crate::infrastructure::storage::{CycleLease, LeaseError, PairState, StateStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Cycle parameters taken from configuration
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub limits: PriceLimits,
    pub reward_mode: RewardMode,
    pub lease_ttl: Duration,
    /// Identifies this process in lease documents
    pub holder_id: String,
}

impl CycleSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            limits: config.limits,
            reward_mode: config.rewards.mode,
            lease_ttl: config.tuning.lease_ttl(),
            holder_id: CycleLease::new_holder_id(),
        }
    }
}

/// Collaborators of the engine, built once per process
pub struct AgentContext {
    pub gateway: Arc<dyn ChainGateway>,
    pub store: Arc<dyn StateStore>,
    pub halt: Arc<dyn EmergencyHalt>,
    pub settings: CycleSettings,
}

impl AgentContext {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        store: Arc<dyn StateStore>,
        halt: Arc<dyn EmergencyHalt>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            gateway,
            store,
            halt,
            settings,
        }
    }
}

pub struct RebalanceEngine {
    context: AgentContext,
    escalation: FailureEscalation,
}

impl RebalanceEngine {
    pub fn new(context: AgentContext) -> Self {
        let escalation = FailureEscalation::new(context.store.clone(), context.halt.clone());
        Self {
            context,
            escalation,
        }
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    pub async fn run_cycle(&self) -> CycleResult<CycleOutcome> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle as if the wall clock read `now`
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleResult<CycleOutcome> {
        let gateway = self.context.gateway.as_ref();

        if !gateway.is_connected().await {
            error!("[Cycle] Failed to connect to the RPC endpoint");
            return Err(CycleError::Connectivity);
        }

        let prefix = match gateway.pair_symbols().await {
            Ok((symbol_x, symbol_y)) => pair_prefix(&symbol_x, &symbol_y),
            Err(e) => {
                warn!("[Cycle] Could not resolve pair symbols ({}), using {}", e, UNKNOWN_PREFIX);
                UNKNOWN_PREFIX.to_string()
            }
        };

        let store = self.context.store.as_ref();
        let settings = &self.context.settings;
        let lease = CycleLease::acquire(store, &prefix, &settings.holder_id, settings.lease_ttl, now)
            .await
            .map_err(|e| match e {
                LeaseError::Held { prefix, holder, .. } => CycleError::Busy { prefix, holder },
                LeaseError::Storage(e) => CycleError::Lease(e),
            })?;

        info!("[Cycle] Starting cycle for {}", prefix);
        let result = self.run_locked(&prefix, now).await;

        if let Err(e) = lease.release(store).await {
            warn!("[Cycle] Failed to release lease for {}: {}", prefix, e);
        }

        match &result {
            Ok(outcome) => info!("[Cycle] {} finished: {}", prefix, outcome.to_response().message),
            Err(e) => error!("[Cycle] {} failed: {}", prefix, e),
        }
        result
    }

    async fn run_locked(&self, prefix: &str, now: DateTime<Utc>) -> CycleResult<CycleOutcome> {
        let gateway = self.context.gateway.as_ref();
        let state = PairState::new(self.context.store.as_ref(), prefix);

        let last_run = state
            .load::<OperationalTimestamp>(StateFile::Time)
            .await
            .map(|t| t.timestamp)
            .unwrap_or(now);
        state
            .save(StateFile::Time, &OperationalTimestamp { timestamp: now })
            .await;
        let new_day = crossed_day_boundary(last_run, now);

        let last_observation = state.load::<PriceObservation>(StateFile::Price).await;
        let live = gateway.current_price().await.map_err(CycleError::Read)?;
        let current = PriceObservation {
            price: live.price,
            token_x: live.token_x,
            token_y: live.token_y,
            timestamp: now,
        };

        let (last_price, first_run) = match last_observation {
            Some(observation) => (observation.price, false),
            None => {
                info!("[Cycle] No price history for {}, first run", prefix);
                state.save(StateFile::Price, &current).await;
                (current.price, true)
            }
        };

        let assessment = PriceAssessment::evaluate(last_price, current.price, &self.context.settings.limits);
        debug!(
            "[Cycle] price {} (last {}, change {:.3}%)",
            assessment.current_price, assessment.last_price, assessment.pct_change
        );

        if !assessment.permits_action() {
            let reason = if !assessment.in_limits {
                NoActionReason::OutOfLimits
            } else {
                NoActionReason::ExcessiveChange
            };
            return Ok(CycleOutcome::NoAction {
                prefix: prefix.to_string(),
                reason,
                assessment,
                rewards: None,
            });
        }

        let position = state
            .load::<StoredPosition>(StateFile::Position)
            .await
            .and_then(StoredPosition::validate);

        match position {
            Some(position) if !first_run => {
                self.manage(&state, position, current, assessment, new_day, now)
                    .await
            }
            _ => self.bootstrap(&state, current, assessment, first_run, now).await,
        }
    }

    /// Existing position: daily rewards, then move liquidity if the price moved
    async fn manage(
        &self,
        state: &PairState<'_>,
        position: Position,
        current: PriceObservation,
        assessment: PriceAssessment,
        new_day: bool,
        now: DateTime<Utc>,
    ) -> CycleResult<CycleOutcome> {
        let gateway = self.context.gateway.as_ref();
        let prefix = state.prefix();

        let rewards = if new_day {
            info!("[Cycle] New day, running reward cycle for bin {}", position.bin_id);
            Some(claim_and_dispose(gateway, self.context.settings.reward_mode, &position).await)
        } else {
            None
        };

        if !assessment.price_changed() {
            return Ok(CycleOutcome::NoAction {
                prefix: prefix.to_string(),
                reason: NoActionReason::PriceUnchanged,
                assessment,
                rewards,
            });
        }

        info!(
            "[Cycle] Price moved {} -> {}, rebalancing out of bin {}",
            assessment.last_price, assessment.current_price, position.bin_id
        );

        let removal = match gateway.remove_liquidity(&position).await {
            Ok(removal) => removal,
            Err(e) => {
                self.escalation.record_failure(prefix, now).await;
                return Err(CycleError::RemoveFailed(e));
            }
        };
        if let RemovalOutcome::Removed { tx_hash, .. } = &removal {
            debug!("[Cycle] Removal confirmed in {:?}", tx_hash);
        }

        // Rewards accrued up to the removal
        if let Err(e) = gateway.claim_rewards(&position).await {
            warn!("[Cycle] Post-removal claim failed: {}", e);
        }

        let new_position = match gateway.add_liquidity().await {
            Ok(Some(new_position)) => new_position,
            Ok(None) => {
                self.escalation.record_failure(prefix, now).await;
                return Err(CycleError::AddFailed(
                    "no balance available on one side of the pair".to_string(),
                ));
            }
            Err(e) => {
                self.escalation.record_failure(prefix, now).await;
                return Err(CycleError::AddFailed(e.to_string()));
            }
        };

        persist_position(state, &new_position, &current).await;

        Ok(CycleOutcome::Rebalanced {
            prefix: prefix.to_string(),
            previous_bin: position.bin_id,
            position: new_position,
            removal,
            assessment,
            rewards,
        })
    }

    /// No usable position on record: open one from wallet balances
    async fn bootstrap(
        &self,
        state: &PairState<'_>,
        current: PriceObservation,
        assessment: PriceAssessment,
        first_run: bool,
        now: DateTime<Utc>,
    ) -> CycleResult<CycleOutcome> {
        let prefix = state.prefix();
        info!("[Cycle] Depositing initial position for {}", prefix);

        let position = match self.context.gateway.add_liquidity().await {
            Ok(Some(position)) => position,
            Ok(None) => {
                self.escalation.record_failure(prefix, now).await;
                return Err(CycleError::BootstrapFailed(
                    "no balance available on one side of the pair".to_string(),
                ));
            }
            Err(e) => {
                self.escalation.record_failure(prefix, now).await;
                return Err(CycleError::BootstrapFailed(e.to_string()));
            }
        };

        persist_position(state, &position, &current).await;

        Ok(CycleOutcome::Deposited {
            prefix: prefix.to_string(),
            position,
            first_run,
            assessment,
        })
    }
}

/// The position and the price it was opened at are written together
async fn persist_position(state: &PairState<'_>, position: &Position, observation: &PriceObservation) {
    let saved_position = state.save(StateFile::Position, position).await;
    let saved_price = state.save(StateFile::Price, observation).await;
    if !(saved_position && saved_price) {
        error!(
            "[Cycle] New position in bin {} is live but could not be fully persisted for {}",
            position.bin_id,
            state.prefix()
        );
    }
}
