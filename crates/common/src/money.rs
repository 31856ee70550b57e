use serde::{Deserialize, Serialize};

/// Currency amount in minor units (1 unit = 100 minor units) to avoid
/// floating point drift in ledger arithmetic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Creates a new amount from minor units.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new amount from whole currency units.
    pub fn from_units(units: i64) -> Self {
        Self {
            cents: units.saturating_mul(100),
        }
    }

    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in minor units.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole-unit portion.
    pub fn units(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the minor-unit remainder after whole units.
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity, saturating at the `i64` bounds.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents.saturating_mul(i64::from(quantity)),
        }
    }

    pub fn checked_add(&self, rhs: Money) -> Option<Money> {
        self.cents.checked_add(rhs.cents).map(Money::from_cents)
    }

    pub fn checked_sub(&self, rhs: Money) -> Option<Money> {
        self.cents.checked_sub(rhs.cents).map(Money::from_cents)
    }

    /// Multiplies by a quantity; `None` if the product leaves the `i64` range.
    pub fn checked_mul(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

    /// Applies a rate expressed in basis points (1% = 100 bps), rounding
    /// half away from zero to the nearest minor unit.
    pub fn apply_basis_points(&self, bps: u32) -> Money {
        let scaled = self.cents as i128 * bps as i128;
        let half = 5_000i128 * scaled.signum();
        Money {
            cents: ((scaled + half) / 10_000).clamp(i64::MIN.into(), i64::MAX.into()) as i64,
        }
    }

    /// Absolute difference between two amounts, in minor units.
    pub fn abs_diff(&self, other: Money) -> u64 {
        self.cents.abs_diff(other.cents)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-{}.{:02}", self.units().abs(), self.cents_part())
        } else {
            write!(f, "{}.{:02}", self.units(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_sub(rhs.cents),
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents = self.cents.saturating_add(rhs.cents);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_units() {
        let money = Money::from_units(50);
        assert_eq!(money.cents(), 5000);
        assert_eq!(money.units(), 50);
        assert_eq!(money.cents_part(), 0);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-12.34");
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!(a.multiply(3).cents(), 3000);
        assert_eq!(vec![a, b, b].into_iter().sum::<Money>().cents(), 2000);
    }

    #[test]
    fn test_basis_points_rounding() {
        // 10% of 2000.00
        assert_eq!(Money::from_units(2000).apply_basis_points(1000).cents(), 20_000);
        // 7.5% of 0.99 = 0.07425 -> 0.07
        assert_eq!(Money::from_cents(99).apply_basis_points(750).cents(), 7);
        // 10% of 0.05 = 0.005 -> rounds half up to 0.01
        assert_eq!(Money::from_cents(5).apply_basis_points(1000).cents(), 1);
    }

    #[test]
    fn test_abs_diff() {
        assert_eq!(Money::from_cents(100).abs_diff(Money::from_cents(99)), 1);
        assert_eq!(Money::from_cents(99).abs_diff(Money::from_cents(100)), 1);
        assert_eq!(
            Money::from_cents(i64::MAX).abs_diff(Money::from_cents(i64::MIN)),
            u64::MAX
        );
    }

    #[test]
    fn test_checked_arithmetic_reports_overflow() {
        let max = Money::from_cents(i64::MAX);

        assert_eq!(max.checked_add(Money::from_cents(1)), None);
        assert_eq!(Money::from_cents(i64::MIN).checked_sub(Money::from_cents(1)), None);
        assert_eq!(max.checked_mul(2), None);
        assert_eq!(
            Money::from_cents(250).checked_mul(4),
            Some(Money::from_cents(1000))
        );
    }

    #[test]
    fn test_operators_saturate() {
        let max = Money::from_cents(i64::MAX);

        assert_eq!(max + max, max);
        assert_eq!(Money::from_cents(i64::MIN) - max, Money::from_cents(i64::MIN));
        assert_eq!(max.multiply(u32::MAX), max);
    }

    #[test]
    fn test_serializes_as_minor_units() {
        let json = serde_json::to_string(&Money::from_cents(250)).unwrap();
        assert_eq!(json, "250");
    }
}
