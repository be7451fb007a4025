//! Decimal helpers shared by the matching engine, risk gate, and ledger.
//!
//! The engine never touches floating point on the execution path; all
//! arithmetic uses `rust_decimal::Decimal` directly. This module only adds
//! the handful of rounding and scaling helpers the rest of the codebase
//! needs on top of the crate's own operators.

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds `value` to `precision` decimal places using banker's rounding
/// (round-half-to-even), matching the rounding mode financial settlement
/// code is expected to use.
pub fn round_bankers(value: Decimal, precision: u32) -> Decimal {
    value.round_dp_with_strategy(precision, RoundingStrategy::MidpointNearestEven)
}

/// Rounds a quantity down to `precision` decimal places. Used when
/// reserving balances: it is always safe to reserve slightly more than is
/// ultimately consumed, never less.
pub fn round_down(value: Decimal, precision: u32) -> Decimal {
    value.round_dp_with_strategy(precision, RoundingStrategy::ToZero)
}

/// `price * quantity`, the notional amount of a fill.
pub fn notional(price: Decimal, quantity: Decimal) -> Decimal {
    price * quantity
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bankers_rounding_rounds_half_to_even() {
        assert_eq!(round_bankers(dec!(2.5), 0), dec!(2));
        assert_eq!(round_bankers(dec!(3.5), 0), dec!(4));
        assert_eq!(round_bankers(dec!(0.125), 2), dec!(0.12));
    }

    #[test]
    fn round_down_never_rounds_up() {
        assert_eq!(round_down(dec!(1.999), 2), dec!(1.99));
    }

    #[test]
    fn notional_multiplies_price_and_quantity() {
        assert_eq!(notional(dec!(100), dec!(0.5)), dec!(50));
    }
}
