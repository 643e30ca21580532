//! Unit conversions for Liquidity Book prices and token amounts

use ethers::types::U256;

/// Convert a 128.128 fixed-point bin price into a decimal-adjusted ratio
///
/// The pair reports `token_y / token_x` in raw units scaled by 2^128; the
/// human price multiplies back by `10^(decimals_x - decimals_y)`.
pub fn price_from_fixed_point(raw: U256, decimals_x: u8, decimals_y: u8) -> f64 {
    let integer = (raw >> 128).as_u128() as f64;
    let fraction = (raw & U256::from(u128::MAX)).as_u128() as f64 / 2f64.powi(128);
    (integer + fraction) * 10f64.powi(decimals_x as i32 - decimals_y as i32)
}

/// Convert a raw token amount into whole-token units
pub fn to_decimal(raw: U256, decimals: u8) -> f64 {
    ethers::utils::format_units(raw, decimals as u32)
        .ok()
        .and_then(|formatted| formatted.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// One whole token in raw units; `None` past 77 decimals, where 10^decimals leaves U256
pub fn one_unit(decimals: u8) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(decimals))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_price_same_decimals() {
        let raw = U256::one() << 128;
        assert_eq!(price_from_fixed_point(raw, 18, 18), 1.0);
    }

    #[test]
    fn test_fractional_price() {
        // 0.25 in 128.128
        let raw = U256::one() << 126;
        assert_eq!(price_from_fixed_point(raw, 18, 18), 0.25);
    }

    #[test]
    fn test_decimal_adjustment() {
        let raw = U256::one() << 128;
        let price = price_from_fixed_point(raw, 18, 6);
        assert!((price - 1e12).abs() < 1.0);

        let price = price_from_fixed_point(raw, 6, 18);
        assert!((price - 1e-12).abs() < 1e-20);
    }

    #[test]
    fn test_to_decimal() {
        assert_eq!(to_decimal(U256::from(1_500_000u64), 6), 1.5);
        assert_eq!(to_decimal(U256::zero(), 18), 0.0);
        assert_eq!(to_decimal(one_unit(18).unwrap() * 5, 18), 5.0);
    }

    #[test]
    fn test_one_unit_overflow_is_none() {
        assert_eq!(one_unit(0), Some(U256::one()));
        assert_eq!(one_unit(77), Some(U256::exp10(77)));
        assert_eq!(one_unit(78), None);
        assert_eq!(one_unit(u8::MAX), None);
    }
}
