//! Rebalancing decision rules
//!
//! Pure functions that the cycle engine composes. Nothing here touches the
//! chain or the state store.

use super::price::one_unit;
use chrono::{DateTime, Utc};
use ethers::types::U256;
use serde::Serialize;

/// Price band and per-cycle movement limit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLimits {
    /// Exclusive lower bound of the operating band
    pub lower: f64,
    /// Exclusive upper bound of the operating band
    pub upper: f64,
    /// Maximum absolute percentage change accepted between two cycles
    pub max_change_pct: f64,
}

impl PriceLimits {
    /// Open-interval band check
    pub fn in_band(&self, price: f64) -> bool {
        price > self.lower && price < self.upper
    }
}

/// Result of checking the live price against the previous cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceAssessment {
    pub current_price: f64,
    pub last_price: f64,
    pub pct_change: f64,
    pub in_limits: bool,
    pub change_acceptable: bool,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub max_change_pct: f64,
}

impl PriceAssessment {
    pub fn evaluate(last_price: f64, current_price: f64, limits: &PriceLimits) -> Self {
        let (pct_change, change_acceptable) = if last_price > 0.0 {
            let pct = (current_price - last_price) / last_price * 100.0;
            (pct, pct.abs() < limits.max_change_pct)
        } else {
            // Zero bootstrap price: nothing to compare against
            (0.0, true)
        };

        Self {
            current_price,
            last_price,
            pct_change,
            in_limits: limits.in_band(current_price),
            change_acceptable,
            lower_limit: limits.lower,
            upper_limit: limits.upper,
            max_change_pct: limits.max_change_pct,
        }
    }

    /// Whether the cycle may go on to touch liquidity
    pub fn permits_action(&self) -> bool {
        self.in_limits && self.change_acceptable
    }

    /// Strict comparison, any nonzero move counts
    pub fn price_changed(&self) -> bool {
        self.current_price != self.last_price
    }
}

/// True when `now` falls on a later (or earlier) calendar day than `last`
pub fn crossed_day_boundary(last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    last.date_naive() != now.date_naive()
}

/// Amount of a token balance to commit to a new deposit, in raw units
///
/// - zero balance contributes nothing
/// - up to one whole token contributes 10% of the balance
/// - otherwise one whole token is held back for gas and rounding
pub fn deposit_amount(balance: U256, decimals: u8) -> U256 {
    if balance.is_zero() {
        return U256::zero();
    }
    match one_unit(decimals) {
        Some(unit) if balance > unit => balance - unit,
        // A unit too large for U256 exceeds every balance
        _ => balance / 10,
    }
}
