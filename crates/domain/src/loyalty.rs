//! Loyalty arithmetic: cashback, affiliate commission and coin conversion.
//!
//! All inputs are [`Money`] in minor units; coin results are floored.

use common::Money;

/// Coins granted per whole currency unit.
pub const COINS_PER_UNIT: i64 = 10;

/// Cashback rate in basis points (5%).
pub const CASHBACK_RATE_BPS: u32 = 500;

/// Commission rate used when no active commission setting exists (10%).
pub const DEFAULT_COMMISSION_RATE_BPS: u32 = 1_000;

/// Converts a currency amount to coins, flooring fractional coins.
pub fn coins_for(amount: Money) -> i64 {
    let scaled = amount.cents().max(0) as i128 * COINS_PER_UNIT as i128;
    (scaled / 100) as i64
}

/// Cashback coins earned on an order total: `floor(total * 5% * 10)`.
///
/// Computed without intermediate rounding to minor units.
pub fn cashback_coins(total: Money) -> i64 {
    let scaled = total.cents().max(0) as i128 * CASHBACK_RATE_BPS as i128 * COINS_PER_UNIT as i128;
    (scaled / (10_000 * 100)) as i64
}

/// Affiliate commission on an order total at the given rate.
pub fn commission_for(total: Money, rate_bps: u32) -> Money {
    total.apply_basis_points(rate_bps)
}
