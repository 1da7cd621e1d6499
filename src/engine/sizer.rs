//! Position sizer.
//!
//! Splits the spendable balance into thirds so one signal can never
//! consume the whole account, with a fallback to the full spendable
//! amount for stocks too expensive for a one-third slice. Quantities
//! are whole shares, floored; zero means the signal is skipped.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Fraction of the cash balance the sizer may spend. The remainder is
/// an untouchable buffer.
fn spendable_fraction() -> Decimal {
    Decimal::new(95, 2) // 0.95
}

/// Diversification divisor for a single entry.
fn slice_divisor() -> Decimal {
    Decimal::from(3)
}

/// Whole-share quantity to buy at `price` from `balance`.
///
/// Returns 0 when even the fallback allocation cannot afford one
/// share. Never returns a quantity whose cost exceeds the spendable
/// balance.
pub fn size_buy(balance: Decimal, price: Decimal) -> i64 {
    if price <= Decimal::ZERO || balance <= Decimal::ZERO {
        return 0;
    }

    let allocatable = balance * spendable_fraction();
    let mut target = allocatable / slice_divisor();

    // Expensive stock: a third won't buy a single share, so allow the
    // full spendable amount instead of skipping outright.
    if target < price {
        target = allocatable;
    }

    (target / price).floor().to_i64().unwrap_or(0).max(0)
}
