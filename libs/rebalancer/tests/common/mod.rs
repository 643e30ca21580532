//! Shared fakes for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ethers::types::{Address, TxHash, U256};
use parking_lot::Mutex;
use rebalancer::application::{AgentContext, CycleSettings, RebalanceEngine};
use rebalancer::domain::{Position, PriceLimits};
use rebalancer::infrastructure::client::{
    ChainGateway, ClaimOutcome, GatewayError, PoolPrice, RemovalOutcome, SwapRoute, TradeOutcome,
    TransferOutcome,
};
use rebalancer::infrastructure::config::RewardMode;
use rebalancer::infrastructure::halt::{EmergencyHalt, HaltReport};
use rebalancer::infrastructure::storage::MemoryStateStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const PREFIX: &str = "wS_USDC.e";
pub const TOKEN_X: &str = "0x039e2fB66102314Ce7b64Ce5Ce3E5183bc94aD38";
pub const TOKEN_Y: &str = "0x29219dd400f2Bf60E5a23d13Be72B486D4038894";
pub const WALLET: &str = "0x9a8B7C6d5E4f3a2B1c0D9e8F7a6B5c4D3e2F1a0B";
pub const OLD_BIN: u32 = 8_388_600;
pub const ACTIVE_BIN: u32 = 8_388_608;

pub fn address(raw: &str) -> Address {
    raw.parse().unwrap()
}

/// 2025-03-01 at the given time, UTC
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, hour, minute, 0).unwrap()
}

pub fn limits() -> PriceLimits {
    PriceLimits {
        lower: 1.0,
        upper: 2.0,
        max_change_pct: 5.0,
    }
}

/// Gateway interactions that change chain state
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Remove(u32),
    Add(u32),
    Claim(u32),
    Trade,
    TransferRewards,
    TransferTokens(Address, U256),
}

pub struct FakeGateway {
    pub connected: Mutex<bool>,
    pub symbols: Mutex<Option<(String, String)>>,
    pub price: Mutex<f64>,
    pub active_bin: Mutex<u32>,
    pub fail_remove: Mutex<bool>,
    pub nothing_to_remove: Mutex<bool>,
    pub fail_add: Mutex<bool>,
    pub empty_wallet: Mutex<bool>,
    pub pending_rewards: Mutex<f64>,
    pub low_gas: Mutex<bool>,
    pub mutations: Mutex<Vec<Mutation>>,
}

impl FakeGateway {
    pub fn new(price: f64) -> Self {
        Self {
            connected: Mutex::new(true),
            symbols: Mutex::new(Some(("wS".to_string(), "USDC.e".to_string()))),
            price: Mutex::new(price),
            active_bin: Mutex::new(ACTIVE_BIN),
            fail_remove: Mutex::new(false),
            nothing_to_remove: Mutex::new(false),
            fail_add: Mutex::new(false),
            empty_wallet: Mutex::new(false),
            pending_rewards: Mutex::new(0.0),
            low_gas: Mutex::new(false),
            mutations: Mutex::new(Vec::new()),
        }
    }

    pub fn set_price(&self, price: f64) {
        *self.price.lock() = price;
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().clone()
    }

    pub fn clear_mutations(&self) {
        self.mutations.lock().clear();
    }

    fn record(&self, mutation: Mutation) {
        self.mutations.lock().push(mutation);
    }
}

fn tx_hash(n: u64) -> TxHash {
    TxHash::from_low_u64_be(n)
}

#[async_trait]
impl ChainGateway for FakeGateway {
    async fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn pair_symbols(&self) -> Result<(String, String), GatewayError> {
        self.symbols
            .lock()
            .clone()
            .ok_or_else(|| GatewayError::Read("symbol() reverted".to_string()))
    }

    async fn current_price(&self) -> Result<PoolPrice, GatewayError> {
        Ok(PoolPrice {
            price: *self.price.lock(),
            active_id: *self.active_bin.lock(),
            token_x: address(TOKEN_X),
            token_y: address(TOKEN_Y),
        })
    }

    async fn add_liquidity(&self) -> Result<Option<Position>, GatewayError> {
        let bin_id = *self.active_bin.lock();
        if *self.fail_add.lock() {
            return Err(GatewayError::TransactionFailed("addLiquidity reverted".to_string()));
        }
        if *self.empty_wallet.lock() {
            return Ok(None);
        }
        self.record(Mutation::Add(bin_id));
        Ok(Some(Position {
            bin_id,
            token_x: address(TOKEN_X),
            token_y: address(TOKEN_Y),
            size_x: 99.0,
            size_y: 150.0,
            to_address: address(WALLET),
        }))
    }

    async fn remove_liquidity(&self, position: &Position) -> Result<RemovalOutcome, GatewayError> {
        if *self.fail_remove.lock() {
            return Err(GatewayError::TransactionFailed("removeLiquidity reverted".to_string()));
        }
        if *self.nothing_to_remove.lock() {
            return Ok(RemovalOutcome::NothingToRemove);
        }
        self.record(Mutation::Remove(position.bin_id));
        Ok(RemovalOutcome::Removed {
            tx_hash: tx_hash(1),
            bin_id: position.bin_id,
            shares: U256::from(1_000_000u64),
        })
    }

    async fn claim_rewards(&self, position: &Position) -> Result<ClaimOutcome, GatewayError> {
        let pending = *self.pending_rewards.lock();
        if pending == 0.0 {
            return Ok(ClaimOutcome::NothingToClaim);
        }
        self.record(Mutation::Claim(position.bin_id));
        Ok(ClaimOutcome::Claimed {
            tx_hash: tx_hash(2),
            pending,
        })
    }

    async fn trade_rewards(&self) -> Result<TradeOutcome, GatewayError> {
        self.record(Mutation::Trade);
        let route = if *self.low_gas.lock() {
            SwapRoute::ToNative
        } else {
            SwapRoute::ToStable
        };
        Ok(TradeOutcome::Swapped {
            tx_hash: tx_hash(3),
            route,
            amount_in: 12.5,
            received: U256::from(4_200_000u64),
            output_token: address(TOKEN_Y),
        })
    }

    async fn transfer_rewards(&self) -> Result<TransferOutcome, GatewayError> {
        self.record(Mutation::TransferRewards);
        Ok(TransferOutcome::Transferred {
            tx_hash: tx_hash(4),
            token: Address::zero(),
            raw: U256::from(12_500u64),
        })
    }

    async fn transfer_tokens(&self, token: Address, amount: U256) -> Result<TransferOutcome, GatewayError> {
        self.record(Mutation::TransferTokens(token, amount));
        Ok(TransferOutcome::Transferred {
            tx_hash: tx_hash(5),
            token,
            raw: amount,
        })
    }
}

/// Records every halt instead of pausing anything
#[derive(Default)]
pub struct CountingHalt {
    pub halts: Mutex<Vec<(String, u32)>>,
}

impl CountingHalt {
    pub fn count(&self) -> usize {
        self.halts.lock().len()
    }
}

#[async_trait]
impl EmergencyHalt for CountingHalt {
    async fn halt(&self, prefix: &str, failures: u32) -> HaltReport {
        self.halts.lock().push((prefix.to_string(), failures));
        HaltReport {
            scheduler_paused: true,
            operator_notified: true,
        }
    }
}

pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub store: Arc<MemoryStateStore>,
    pub halt: Arc<CountingHalt>,
    pub engine: RebalanceEngine,
}

impl Harness {
    pub fn new(price: f64) -> Self {
        Self::with_mode(price, RewardMode::Trade)
    }

    pub fn with_mode(price: f64, reward_mode: RewardMode) -> Self {
        let gateway = Arc::new(FakeGateway::new(price));
        let store = Arc::new(MemoryStateStore::new());
        let halt = Arc::new(CountingHalt::default());

        let settings = CycleSettings {
            limits: limits(),
            reward_mode,
            lease_ttl: Duration::from_secs(600),
            holder_id: "test-holder".to_string(),
        };
        let context = AgentContext::new(gateway.clone(), store.clone(), halt.clone(), settings);

        Self {
            gateway,
            store,
            halt,
            engine: RebalanceEngine::new(context),
        }
    }

    pub fn file(&self, kind: &str) -> String {
        format!("{}_{}.json", PREFIX, kind)
    }

    /// Seed the state of a pair that already ran today with a position in `OLD_BIN`
    pub fn seed_running_pair(&self, last_price: f64, last_run: DateTime<Utc>) {
        self.store.insert(self.file("time"), json!({ "timestamp": last_run.to_rfc3339() }));
        self.store.insert(
            self.file("price"),
            json!({
                "price": last_price,
                "token_x": TOKEN_X,
                "token_y": TOKEN_Y,
                "timestamp": last_run.to_rfc3339(),
            }),
        );
        self.store.insert(
            self.file("position"),
            json!({
                "bin_id": OLD_BIN,
                "token_x": TOKEN_X,
                "token_y": TOKEN_Y,
                "size_x": 98.0,
                "size_y": 140.0,
                "to_address": WALLET,
            }),
        );
    }

    /// State documents written, ignoring the cycle lease
    pub fn state_writes(&self) -> Vec<String> {
        self.store
            .writes()
            .into_iter()
            .filter(|name| !name.ends_with("_lease.json"))
            .collect()
    }

    pub fn failure_count(&self) -> u64 {
        self.store
            .get(&self.file("failures"))
            .and_then(|doc| doc["count"].as_u64())
            .unwrap_or(0)
    }
}
