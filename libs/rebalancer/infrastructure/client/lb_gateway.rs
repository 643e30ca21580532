//! Liquidity Book gateway over JSON-RPC
//!
//! # Transactions
//!
//! Every state-changing call goes through the same flow: legacy transaction,
//! network gas price, pending nonce, gas estimate times a per-operation buffer
//! (fixed ceiling when estimation fails), local signing, raw submission and a
//! bounded wait for the receipt. A receipt with status other than 1 is a
//! [`GatewayError::TransactionFailed`].
//!
//! # Concurrency Warning
//!
//! Nonces are read from the pending block right before each send. Two
//! gateways sharing a wallet will collide; the cycle lease prevents that.

use super::contracts::{Erc20, LbPair, LbRewarder, LbRouter, LiquidityParameters, Path};
use super::gateway::{
    ChainGateway, ClaimOutcome, GatewayError, PoolPrice, RemovalOutcome, Result, SwapRoute,
    TokenBalance, TradeOutcome, TransferOutcome,
};
use crate::domain::{deposit_amount, one_unit, price_from_fixed_point, to_decimal, Position};
use crate::infrastructure::config::{ChainConfig, RewardConfig, RouteHops, TuningConfig};
use crate::infrastructure::retry::{with_retry, CallPolicy};
use async_trait::async_trait;
use chrono::Utc;
use ethers::abi::Detokenize;
use ethers::contract::{ContractCall, ContractError};
use ethers::prelude::*;
use ethers::providers::RpcError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Symbol reported for the chain's native token
const NATIVE_SYMBOL: &str = "S";

/// Allowance below this many whole tokens triggers a fresh approval
const MIN_ALLOWANCE_TOKENS: u64 = 1_000_000;

/// Active bin may move this many ids before the deposit reverts
const ID_SLIPPAGE: u64 = 10;

/// Router deadline relative to submission
const DEADLINE_SECS: i64 = 3600;

/// 100% distribution weight, 1e18 fixed point
const FULL_WEIGHT: u64 = 1_000_000_000_000_000_000;

/// Estimate multiplier and fallback limit for one kind of transaction
#[derive(Debug, Clone, Copy)]
struct GasPolicy {
    buffer: f64,
    fallback: u64,
}

const APPROVE_GAS: GasPolicy = GasPolicy { buffer: 1.1, fallback: 100_000 };
const ADD_GAS: GasPolicy = GasPolicy { buffer: 1.3, fallback: 500_000 };
const REMOVE_GAS: GasPolicy = GasPolicy { buffer: 1.3, fallback: 1_000_000 };
const CLAIM_GAS: GasPolicy = GasPolicy { buffer: 1.2, fallback: 200_000 };
const TRANSFER_GAS: GasPolicy = GasPolicy { buffer: 1.1, fallback: 500_000 };
const SWAP_GAS: GasPolicy = GasPolicy { buffer: 1.5, fallback: 500_000 };

/// Settings the gateway needs beyond contract addresses
#[derive(Debug, Clone)]
pub struct TradeSettings {
    pub native_token: Address,
    pub stable_token: Address,
    pub low_gas_threshold: f64,
    pub swap_min_out: U256,
    pub low_gas_swap_cap: Option<f64>,
    pub stable_route: RouteHops,
    pub native_route: RouteHops,
}

impl From<&TuningConfig> for TradeSettings {
    fn from(tuning: &TuningConfig) -> Self {
        Self {
            native_token: tuning.native_token,
            stable_token: tuning.stable_token,
            low_gas_threshold: tuning.low_gas_threshold,
            swap_min_out: U256::from(tuning.swap_min_out),
            low_gas_swap_cap: tuning.low_gas_swap_cap,
            stable_route: tuning.stable_route.clone(),
            native_route: tuning.native_route.clone(),
        }
    }
}

pub struct LbGateway {
    client: Arc<Client>,
    wallet_address: Address,
    router_address: Address,
    reward_wallet: Address,
    pair: LbPair<Client>,
    router: LbRouter<Client>,
    rewarder: LbRewarder<Client>,
    trade: TradeSettings,
    read_policy: CallPolicy,
    receipt_timeout: Duration,
}

impl LbGateway {
    /// Connect to the RPC endpoint and bind the wallet to its chain id
    pub async fn connect(chain: &ChainConfig, rewards: &RewardConfig, tuning: &TuningConfig) -> Result<Self> {
        let provider = Provider::<Http>::try_from(chain.rpc_url.as_str())
            .map_err(|e| GatewayError::Connectivity(format!("invalid RPC URL: {}", e)))?
            .interval(Duration::from_secs(2));

        let wallet: LocalWallet = chain
            .private_key
            .expose()
            .trim_start_matches("0x")
            .parse()
            .map_err(|e: WalletError| GatewayError::Signing(e.to_string()))?;

        let read_policy = CallPolicy::new(tuning.rpc_timeout(), tuning.max_retries);
        let provider_ref = &provider;
        let chain_id = with_retry(&read_policy, "eth_chainId", move || async move {
            provider_ref
                .get_chainid()
                .await
                .map_err(|e| provider_error("eth_chainId", e))
        })
        .await?;

        let wallet = wallet.with_chain_id(chain_id.as_u64());
        let wallet_address = wallet.address();
        let client = Arc::new(SignerMiddleware::new(provider, wallet));

        info!(
            "[LB] Connected to chain {} as {:?}",
            chain_id, wallet_address
        );

        Ok(Self {
            pair: LbPair::new(chain.lb_pair, client.clone()),
            router: LbRouter::new(chain.lb_router, client.clone()),
            rewarder: LbRewarder::new(chain.rewarder, client.clone()),
            client,
            wallet_address,
            router_address: chain.lb_router,
            reward_wallet: rewards.reward_wallet,
            trade: TradeSettings::from(tuning),
            read_policy,
            receipt_timeout: tuning.receipt_timeout(),
        })
    }

    pub fn wallet_address(&self) -> Address {
        self.wallet_address
    }

    /// Run a view call with the read timeout and retry budget
    async fn call<D, F>(&self, operation: &str, build: F) -> Result<D>
    where
        D: Detokenize + Send,
        F: Fn() -> ContractCall<Client, D> + Send + Sync,
    {
        let build = &build;
        with_retry(&self.read_policy, operation, move || async move {
            build().call().await.map_err(|e| contract_error(operation, e))
        })
        .await
    }

    async fn token_addresses(&self) -> Result<(Address, Address)> {
        let token_x = self.call("getTokenX", || self.pair.get_token_x()).await?;
        let token_y = self.call("getTokenY", || self.pair.get_token_y()).await?;
        Ok((token_x, token_y))
    }

    async fn token_symbol(&self, token: Address) -> Result<String> {
        let erc20 = Erc20::new(token, self.client.clone());
        self.call("symbol", || erc20.symbol()).await
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        let erc20 = Erc20::new(token, self.client.clone());
        self.call("decimals", || erc20.decimals()).await
    }

    /// Reward token of the rewarder, read fresh every time
    pub async fn reward_token(&self) -> Result<Address> {
        self.call("getRewardToken", || self.rewarder.get_reward_token()).await
    }

    pub async fn get_token_balance(&self, token: Address) -> Result<TokenBalance> {
        let erc20 = Erc20::new(token, self.client.clone());
        let symbol = self.call("symbol", || erc20.symbol()).await?;
        let decimals = self.call("decimals", || erc20.decimals()).await?;
        let raw = self
            .call("balanceOf", || erc20.balance_of(self.wallet_address))
            .await?;

        Ok(TokenBalance {
            symbol,
            decimals,
            raw,
            amount: to_decimal(raw, decimals),
        })
    }

    pub async fn get_native_balance(&self) -> Result<TokenBalance> {
        let provider = self.client.inner();
        let wallet = self.wallet_address;
        let raw = with_retry(&self.read_policy, "eth_getBalance", move || async move {
            provider
                .get_balance(wallet, None)
                .await
                .map_err(|e| provider_error("eth_getBalance", e))
        })
        .await?;

        Ok(TokenBalance {
            symbol: NATIVE_SYMBOL.to_string(),
            decimals: 18,
            raw,
            amount: to_decimal(raw, 18),
        })
    }

    /// Whether `spender` may move effectively unlimited `token` from the wallet
    pub async fn check_token_approval(&self, token: Address, spender: Address) -> Result<bool> {
        let erc20 = Erc20::new(token, self.client.clone());
        let decimals = self.call("decimals", || erc20.decimals()).await?;
        let allowance = self
            .call("allowance", || erc20.allowance(self.wallet_address, spender))
            .await?;

        let threshold = one_unit(decimals)
            .and_then(|unit| unit.checked_mul(U256::from(MIN_ALLOWANCE_TOKENS)))
            .unwrap_or(U256::MAX);
        Ok(allowance > threshold)
    }

    /// Approve `spender` for the maximum amount of `token`
    pub async fn approve_token(&self, token: Address, spender: Address) -> Result<TxHash> {
        let erc20 = Erc20::new(token, self.client.clone());
        info!("[LB] Approving {:?} for {:?}", token, spender);

        let receipt = self
            .send_transaction("approve", erc20.approve(spender, U256::MAX), APPROVE_GAS)
            .await
            .map_err(|e| GatewayError::ApprovalFailed(format!("{:?}: {}", token, e)))?;
        Ok(receipt.transaction_hash)
    }

    async fn ensure_router_approval(&self, token: Address) -> Result<()> {
        if !self.check_token_approval(token, self.router_address).await? {
            self.approve_token(token, self.router_address).await?;
        }
        Ok(())
    }

    /// The router moves bin shares on the wallet's behalf during removal
    async fn ensure_share_approval(&self) -> Result<()> {
        let approved = self
            .call("isApprovedForAll", || {
                self.pair.is_approved_for_all(self.wallet_address, self.router_address)
            })
            .await?;
        if approved {
            return Ok(());
        }

        info!("[LB] Approving router for bin shares");
        self.send_transaction(
            "approveForAll",
            self.pair.approve_for_all(self.router_address, true),
            APPROVE_GAS,
        )
        .await
        .map_err(|e| GatewayError::ApprovalFailed(format!("bin shares: {}", e)))?;
        Ok(())
    }

    fn deadline() -> U256 {
        U256::from((Utc::now().timestamp() + DEADLINE_SECS).max(0) as u64)
    }

    /// Balance of the token a swap route pays out in
    async fn output_balance(&self, route: SwapRoute) -> Result<U256> {
        match route {
            SwapRoute::ToStable => Ok(self.get_token_balance(self.trade.stable_token).await?.raw),
            SwapRoute::ToNative => Ok(self.get_native_balance().await?.raw),
        }
    }

    /// Price, sign, submit and confirm one transaction
    ///
    /// Never retried: a send that timed out may still have landed.
    async fn send_transaction<D>(
        &self,
        operation: &str,
        call: ContractCall<Client, D>,
        gas: GasPolicy,
    ) -> Result<TransactionReceipt>
    where
        D: Detokenize + Send + Sync,
    {
        let provider = self.client.inner();
        let wallet = self.wallet_address;

        let gas_price = with_retry(&self.read_policy, "eth_gasPrice", move || async move {
            provider
                .get_gas_price()
                .await
                .map_err(|e| provider_error("eth_gasPrice", e))
        })
        .await?;

        let nonce = with_retry(&self.read_policy, "eth_getTransactionCount", move || async move {
            provider
                .get_transaction_count(wallet, Some(BlockNumber::Pending.into()))
                .await
                .map_err(|e| provider_error("eth_getTransactionCount", e))
        })
        .await?;

        let call = call.legacy().from(wallet).gas_price(gas_price).nonce(nonce);

        let call_ref = &call;
        let estimate = with_retry(&self.read_policy, "eth_estimateGas", move || async move {
            call_ref
                .estimate_gas()
                .await
                .map_err(|e| contract_error("eth_estimateGas", e))
        })
        .await;

        let gas_limit = match estimate {
            Ok(estimate) => buffered_gas(estimate, gas.buffer),
            Err(e) => {
                warn!(
                    "[LB] Gas estimation for {} failed ({}), using fallback {}",
                    operation, e, gas.fallback
                );
                U256::from(gas.fallback)
            }
        };
        let call = call.gas(gas_limit);

        let pending_tx = call
            .send()
            .await
            .map_err(|e| GatewayError::TransactionFailed(format!("{} not submitted: {}", operation, e)))?;

        let tx_hash = pending_tx.tx_hash();
        debug!(
            "[LB] {} sent: {:?} (nonce: {}, gas: {}, gas_price: {})",
            operation, tx_hash, nonce, gas_limit, gas_price
        );

        let receipt = tokio::time::timeout(self.receipt_timeout, pending_tx)
            .await
            .map_err(|_| {
                GatewayError::Timeout(format!("{} receipt for {:?}", operation, tx_hash))
            })?
            .map_err(|e| {
                GatewayError::TransactionFailed(format!("{} receipt for {:?}: {}", operation, tx_hash, e))
            })?
            .ok_or_else(|| {
                GatewayError::TransactionFailed(format!("{} {:?} dropped from mempool", operation, tx_hash))
            })?;

        if receipt.status == Some(U64::from(1)) {
            info!("[LB] {} confirmed: {:?}", operation, tx_hash);
            Ok(receipt)
        } else {
            Err(GatewayError::TransactionFailed(format!(
                "{} reverted: {:?}",
                operation, tx_hash
            )))
        }
    }
}

#[async_trait]
impl ChainGateway for LbGateway {
    async fn is_connected(&self) -> bool {
        let provider = self.client.inner();
        let block_number = with_retry(
            &self.read_policy,
            "eth_blockNumber",
            move || async move {
                provider
                    .get_block_number()
                    .await
                    .map_err(|e| provider_error("eth_blockNumber", e))
            },
        )
        .await;

        match block_number {
            Ok(block) => {
                debug!("[LB] Connected, block {}", block);
                true
            }
            Err(e) => {
                warn!("[LB] Connectivity check failed: {}", e);
                false
            }
        }
    }

    async fn pair_symbols(&self) -> Result<(String, String)> {
        let (token_x, token_y) = self.token_addresses().await?;
        let symbol_x = self.token_symbol(token_x).await?;
        let symbol_y = self.token_symbol(token_y).await?;
        Ok((symbol_x, symbol_y))
    }

    async fn current_price(&self) -> Result<PoolPrice> {
        let (token_x, token_y) = self.token_addresses().await?;
        let active_id = self.call("getActiveId", || self.pair.get_active_id()).await?;
        let raw = self
            .call("getPriceFromId", || self.pair.get_price_from_id(active_id))
            .await?;
        let decimals_x = self.token_decimals(token_x).await?;
        let decimals_y = self.token_decimals(token_y).await?;

        let price = price_from_fixed_point(raw, decimals_x, decimals_y);
        debug!("[LB] Active bin {} price {}", active_id, price);

        Ok(PoolPrice {
            price,
            active_id,
            token_x,
            token_y,
        })
    }

    async fn add_liquidity(&self) -> Result<Option<Position>> {
        let active_id = self.call("getActiveId", || self.pair.get_active_id()).await?;
        let (token_x, token_y) = self.token_addresses().await?;
        let balance_x = self.get_token_balance(token_x).await?;
        let balance_y = self.get_token_balance(token_y).await?;

        let amount_x = deposit_amount(balance_x.raw, balance_x.decimals);
        let amount_y = deposit_amount(balance_y.raw, balance_y.decimals);
        for (amount, balance) in [(amount_x, &balance_x), (amount_y, &balance_y)] {
            if amount.is_zero() {
                warn!("[LB] No {} available for liquidity", balance.symbol);
            }
        }
        if amount_x.is_zero() || amount_y.is_zero() {
            return Ok(None);
        }

        self.ensure_router_approval(token_x).await?;
        self.ensure_router_approval(token_y).await?;

        let bin_step = self.call("getBinStep", || self.pair.get_bin_step()).await?;
        let full_weight = U256::from(FULL_WEIGHT);
        let params = LiquidityParameters {
            token_x,
            token_y,
            bin_step: U256::from(bin_step),
            amount_x,
            amount_y,
            amount_x_min: U256::zero(),
            amount_y_min: U256::zero(),
            active_id_desired: U256::from(active_id),
            id_slippage: U256::from(ID_SLIPPAGE),
            delta_ids: vec![I256::zero()],
            distribution_x: vec![full_weight],
            distribution_y: vec![full_weight],
            to: self.wallet_address,
            refund_to: self.wallet_address,
            deadline: Self::deadline(),
        };

        let size_x = to_decimal(amount_x, balance_x.decimals);
        let size_y = to_decimal(amount_y, balance_y.decimals);
        info!(
            "[LB] Adding {} {} + {} {} at bin {}",
            size_x, balance_x.symbol, size_y, balance_y.symbol, active_id
        );

        self.send_transaction("addLiquidity", self.router.add_liquidity(params), ADD_GAS)
            .await?;

        Ok(Some(Position {
            bin_id: active_id,
            token_x,
            token_y,
            size_x,
            size_y,
            to_address: self.wallet_address,
        }))
    }

    async fn remove_liquidity(&self, position: &Position) -> Result<RemovalOutcome> {
        let bin_id = position.bin_id;
        let shares = self
            .call("balanceOf", || {
                self.pair.balance_of(self.wallet_address, U256::from(bin_id))
            })
            .await?;

        if shares.is_zero() {
            info!("[LB] No shares left in bin {}", bin_id);
            return Ok(RemovalOutcome::NothingToRemove);
        }

        self.ensure_share_approval().await?;

        let (token_x, token_y) = self.token_addresses().await?;
        let bin_step = self.call("getBinStep", || self.pair.get_bin_step()).await?;
        let call = self.router.remove_liquidity(
            token_x,
            token_y,
            bin_step,
            U256::zero(),
            U256::zero(),
            vec![U256::from(bin_id)],
            vec![shares],
            self.wallet_address,
            Self::deadline(),
        );

        let receipt = self.send_transaction("removeLiquidity", call, REMOVE_GAS).await?;
        info!("[LB] Liquidity removed from bin {}", bin_id);

        Ok(RemovalOutcome::Removed {
            tx_hash: receipt.transaction_hash,
            bin_id,
            shares,
        })
    }

    async fn claim_rewards(&self, position: &Position) -> Result<ClaimOutcome> {
        let ids = vec![U256::from(position.bin_id)];
        let pending_raw = self
            .call("getPendingRewards", || {
                self.rewarder.get_pending_rewards(self.wallet_address, ids.clone())
            })
            .await?;

        if pending_raw.is_zero() {
            info!("[LB] No rewards to claim for bin {}", position.bin_id);
            return Ok(ClaimOutcome::NothingToClaim);
        }

        let reward_token = self.reward_token().await?;
        let pending = to_decimal(pending_raw, self.token_decimals(reward_token).await?);

        let receipt = self
            .send_transaction(
                "claim",
                self.rewarder.claim(self.wallet_address, ids.clone()),
                CLAIM_GAS,
            )
            .await?;

        Ok(ClaimOutcome::Claimed {
            tx_hash: receipt.transaction_hash,
            pending,
        })
    }

    async fn trade_rewards(&self) -> Result<TradeOutcome> {
        let reward_token = self.reward_token().await?;
        let reward = self.get_token_balance(reward_token).await?;
        if reward.raw.is_zero() {
            info!("[LB] No {} to trade", reward.symbol);
            return Ok(TradeOutcome::NothingToTrade);
        }

        let native = self.get_native_balance().await?;
        self.ensure_router_approval(reward_token).await?;

        let trade = &self.trade;
        let (route, hops, token_path, output_token, amount_in) = if native.amount > trade.low_gas_threshold {
            (
                SwapRoute::ToStable,
                &trade.stable_route,
                vec![reward_token, trade.native_token, trade.stable_token],
                trade.stable_token,
                reward.raw,
            )
        } else {
            let amount_in = match trade.low_gas_swap_cap {
                Some(cap) => reward.raw.min(whole_tokens(cap, reward.decimals)),
                None => reward.raw,
            };
            (
                SwapRoute::ToNative,
                &trade.native_route,
                vec![reward_token, trade.native_token],
                trade.native_token,
                amount_in,
            )
        };

        let path = Path {
            pair_bin_steps: hops.bin_steps.iter().map(|step| U256::from(*step)).collect(),
            versions: hops.versions.clone(),
            token_path,
        };

        let before = self.output_balance(route).await?;
        let call = match route {
            SwapRoute::ToStable => self.router.swap_exact_tokens_for_tokens(
                amount_in,
                trade.swap_min_out,
                path,
                self.wallet_address,
                Self::deadline(),
            ),
            SwapRoute::ToNative => self.router.swap_exact_tokens_for_native(
                amount_in,
                trade.swap_min_out,
                path,
                self.wallet_address,
                Self::deadline(),
            ),
        };

        let receipt = self.send_transaction("swap", call, SWAP_GAS).await?;
        let after = self.output_balance(route).await?;

        let amount_in = to_decimal(amount_in, reward.decimals);
        info!("[LB] {} {} traded via {:?}", amount_in, reward.symbol, route);

        Ok(TradeOutcome::Swapped {
            tx_hash: receipt.transaction_hash,
            route,
            amount_in,
            received: after.saturating_sub(before),
            output_token,
        })
    }

    async fn transfer_rewards(&self) -> Result<TransferOutcome> {
        let reward_token = self.reward_token().await?;
        let reward = self.get_token_balance(reward_token).await?;
        if reward.raw.is_zero() {
            info!("[LB] No {} to send", reward.symbol);
            return Ok(TransferOutcome::NothingToTransfer);
        }
        self.transfer_tokens(reward_token, reward.raw).await
    }

    async fn transfer_tokens(&self, token: Address, amount: U256) -> Result<TransferOutcome> {
        if amount.is_zero() {
            return Ok(TransferOutcome::NothingToTransfer);
        }

        let erc20 = Erc20::new(token, self.client.clone());
        let receipt = self
            .send_transaction("transfer", erc20.transfer(self.reward_wallet, amount), TRANSFER_GAS)
            .await?;
        info!("[LB] Sent {} of {:?} to {:?}", amount, token, self.reward_wallet);

        Ok(TransferOutcome::Transferred {
            tx_hash: receipt.transaction_hash,
            token,
            raw: amount,
        })
    }
}

/// Classify a failed contract call: an RPC error response (revert, bad
/// params) is a read failure, anything else means the node was unreachable
fn contract_error(operation: &str, e: ContractError<Client>) -> GatewayError {
    let answered = match &e {
        ContractError::MiddlewareError { e: inner } => {
            MiddlewareError::as_error_response(inner).is_some()
        }
        ContractError::ProviderError { e: inner } => RpcError::as_error_response(inner).is_some(),
        _ => true,
    };

    if answered {
        GatewayError::Read(format!("{}: {}", operation, e))
    } else {
        GatewayError::Connectivity(format!("{}: {}", operation, e))
    }
}

fn provider_error(operation: &str, e: ProviderError) -> GatewayError {
    if RpcError::as_error_response(&e).is_some() {
        GatewayError::Read(format!("{}: {}", operation, e))
    } else {
        GatewayError::Connectivity(format!("{}: {}", operation, e))
    }
}

fn buffered_gas(estimate: U256, buffer: f64) -> U256 {
    let percent = (buffer * 100.0).round() as u64;
    estimate.saturating_mul(U256::from(percent)) / U256::from(100u64)
}

/// Whole-token amount in raw units, truncated
fn whole_tokens(amount: f64, decimals: u8) -> U256 {
    let raw = amount * 10f64.powi(decimals as i32);
    if raw.is_finite() && raw > 0.0 {
        U256::from(raw as u128)
    } else {
        U256::zero()
    }
}
