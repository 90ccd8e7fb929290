//! Monetary types for price and size representation.
//!
//! All monetary and size quantities are exact fixed-point decimals;
//! binary floating point is never used for money.

use rust_decimal::Decimal;

/// Price in quote-asset units per base unit (USDC per BTC).
pub type Price = Decimal;

/// Size in base-asset units (BTC).
pub type Amount = Decimal;

/// Basis points per unit ratio: `ratio * BPS_SCALE` yields bps.
pub const BPS_SCALE: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// One hundred, for percent conversions.
pub const HUNDRED: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn scale_constants_are_exact() {
        assert_eq!(BPS_SCALE, dec!(10000));
        assert_eq!(HUNDRED, dec!(100));
    }

    #[test]
    fn bps_of_a_ratio() {
        let ratio = dec!(0.001875);
        assert_eq!(ratio * BPS_SCALE, dec!(18.75));
    }
}
