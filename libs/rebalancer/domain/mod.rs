//! Domain Layer
//!
//! State documents, price conversions and the decision rules of a
//! rebalancing cycle. No I/O happens in this layer.

pub mod decision;
pub mod fields;
pub mod models;
pub mod price;

pub use decision::{crossed_day_boundary, deposit_amount, PriceAssessment, PriceLimits};
pub use models::{
    pair_prefix, FailureRecord, LeaseRecord, OperationalTimestamp, Position, PriceObservation,
    StateFile, StoredPosition, UNKNOWN_PREFIX,
};
pub use price::{one_unit, price_from_fixed_point, to_decimal};
