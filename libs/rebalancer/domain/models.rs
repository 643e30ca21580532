//! Persisted state documents
//!
//! Each document lives in its own JSON file named `<prefix>_<kind>.json`,
//! where the prefix is derived from the live pair symbols (`SYMBOLX_SYMBOLY`).

use super::fields::{checksummed, iso8601};
use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// Prefix used when the pair symbols cannot be resolved from the chain
pub const UNKNOWN_PREFIX: &str = "UNKNOWN_UNKNOWN";

/// Kinds of state files kept per pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFile {
    Time,
    Price,
    Position,
    Failures,
    Lease,
}

impl StateFile {
    fn suffix(&self) -> &'static str {
        match self {
            StateFile::Time => "time",
            StateFile::Price => "price",
            StateFile::Position => "position",
            StateFile::Failures => "failures",
            StateFile::Lease => "lease",
        }
    }

    /// Full object name for this file under the given pair prefix
    pub fn name(&self, prefix: &str) -> String {
        format!("{}_{}.json", prefix, self.suffix())
    }
}

/// Build the state prefix from the pair's token symbols
///
/// Symbols come from arbitrary token contracts, so anything that is not
/// safe in a file or object name becomes `-`.
pub fn pair_prefix(symbol_x: &str, symbol_y: &str) -> String {
    format!("{}_{}", name_safe(symbol_x), name_safe(symbol_y))
}

fn name_safe(symbol: &str) -> String {
    let cleaned: String = symbol
        .chars()
        .enumerate()
        .map(|(i, c)| match c {
            '.' if i == 0 => '-',
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+') => c,
            _ => '-',
        })
        .collect();
    if cleaned.is_empty() {
        "UNKNOWN".to_string()
    } else {
        cleaned
    }
}

/// An open single-bin liquidity deposit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub bin_id: u32,
    #[serde(with = "checksummed")]
    pub token_x: Address,
    #[serde(with = "checksummed")]
    pub token_y: Address,
    /// Deposited amount of token X in whole-token units
    pub size_x: f64,
    /// Deposited amount of token Y in whole-token units
    pub size_y: f64,
    #[serde(with = "checksummed")]
    pub to_address: Address,
}

/// Position document as found on disk
///
/// Every field is optional so that partial or hand-edited documents load;
/// [`StoredPosition::validate`] decides whether it describes a usable position.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoredPosition {
    #[serde(default)]
    pub bin_id: Option<u32>,
    #[serde(default)]
    pub token_x: Option<String>,
    #[serde(default)]
    pub token_y: Option<String>,
    #[serde(default)]
    pub size_x: Option<f64>,
    #[serde(default)]
    pub size_y: Option<f64>,
    #[serde(default)]
    pub to_address: Option<String>,
}

impl StoredPosition {
    /// A position is valid when bin id and both token addresses are present
    pub fn validate(self) -> Option<Position> {
        let bin_id = self.bin_id?;
        let token_x = parse_required_address(self.token_x.as_deref())?;
        let token_y = parse_required_address(self.token_y.as_deref())?;
        let to_address = self
            .to_address
            .as_deref()
            .and_then(|raw| raw.parse::<Address>().ok())
            .unwrap_or_default();

        Some(Position {
            bin_id,
            token_x,
            token_y,
            size_x: self.size_x.unwrap_or_default(),
            size_y: self.size_y.unwrap_or_default(),
            to_address,
        })
    }
}

fn parse_required_address(raw: Option<&str>) -> Option<Address> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<Address>().ok()
}

/// Pool price reading taken once per cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Token Y per token X, decimal adjusted
    pub price: f64,
    #[serde(with = "checksummed")]
    pub token_x: Address,
    #[serde(with = "checksummed")]
    pub token_y: Address,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
}

/// Wall-clock time of the last invocation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperationalTimestamp {
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
}

/// Consecutive failure counter for one pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(default)]
    pub count: u32,
    #[serde(default, with = "iso8601::option", skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(default, with = "iso8601::option", skip_serializing_if = "Option::is_none")]
    pub last_estop: Option<DateTime<Utc>>,
}

/// Exclusive claim on a pair prefix for the duration of one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub holder: String,
    /// Unique per acquisition; tells our own lease apart from another cycle's
    #[serde(default)]
    pub token: String,
    #[serde(with = "iso8601")]
    pub acquired_at: DateTime<Utc>,
    #[serde(with = "iso8601")]
    pub expires_at: DateTime<Utc>,
}

impl LeaseRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
