// Fixed-point money and price multipliers
// All booking arithmetic goes through these two types so totals never drift.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

const MINOR_PER_MAJOR: i64 = 100;
const BASIS_POINTS_ONE: u32 = 10_000;

/// An amount of money in minor currency units (cents).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn from_major(major: i64) -> Self {
        Self(major * MINOR_PER_MAJOR)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    // Percentage of this amount, rounded to the minor unit
    pub fn percent(self, percentage: u32) -> Money {
        Money(div_round(self.0 as i128 * percentage as i128, 100) as i64)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{}{}.{:02}",
            sign,
            abs / MINOR_PER_MAJOR as u64,
            abs % MINOR_PER_MAJOR as u64
        )
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Money;

    fn mul(self, rhs: i64) -> Money {
        Money(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

/// A price-scaling factor stored as basis points (1.2 == 12_000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multiplier(u32);

impl Multiplier {
    pub const ONE: Multiplier = Multiplier(BASIS_POINTS_ONE);
    pub const ZERO: Multiplier = Multiplier(0);

    pub const fn from_basis_points(bp: u32) -> Self {
        Self(bp)
    }

    // Converts a decimal factor, rejecting negative and non-finite values
    pub fn from_f64(factor: f64) -> Option<Self> {
        if !factor.is_finite() || factor < 0.0 {
            return None;
        }
        let bp = (factor * BASIS_POINTS_ONE as f64).round();
        if bp > u32::MAX as f64 {
            return None;
        }
        Some(Self(bp as u32))
    }

    pub const fn basis_points(self) -> u32 {
        self.0
    }

    pub fn is_identity(self) -> bool {
        self.0 == BASIS_POINTS_ONE
    }

    // Scales an amount, rounding to the minor unit
    pub fn apply(self, amount: Money) -> Money {
        Money(div_round(
            amount.minor() as i128 * self.0 as i128,
            BASIS_POINTS_ONE as i128,
        ) as i64)
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Multiplier::ONE
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{:.4}", self.0 as f64 / BASIS_POINTS_ONE as f64)
    }
}

/// Multiplies `unit_price` by every factor and by `quantity` in full precision.
///
/// Intermediate products are never rounded. When at least one non-identity
/// factor is involved the final amount is rounded to the nearest whole
/// currency unit; otherwise the exact minor-unit product is returned.
pub fn scale(unit_price: Money, factors: &[Multiplier], quantity: i64) -> Money {
    let mut numerator = unit_price.minor() as i128 * quantity as i128;
    let mut denominator: i128 = 1;
    for factor in factors {
        numerator *= factor.basis_points() as i128;
        denominator *= BASIS_POINTS_ONE as i128;
    }

    if factors.iter().all(|f| f.is_identity()) {
        return Money((numerator / denominator) as i64);
    }

    let whole_units = div_round(numerator, denominator * MINOR_PER_MAJOR as i128);
    Money(whole_units as i64 * MINOR_PER_MAJOR)
}

// Integer division rounding half away from zero
fn div_round(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator.abs() {
        if (numerator < 0) ^ (denominator < 0) {
            quotient - 1
        } else {
            quotient + 1
        }
    } else {
        quotient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_display_formats_minor_units() {
        assert_eq!(Money::from_minor(24_050).to_string(), "240.50");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test_case(100_000, 50, 50_000; "#1 half of 1000")]
    #[test_case(100_000, 75, 75_000; "#2 three quarters")]
    #[test_case(3_333, 25, 833; "#3 rounds down below half")]
    #[test_case(3_334, 25, 834; "#4 rounds half away from zero")]
    #[test_case(100_000, 0, 0; "#5 zero percent")]
    fn test_percent_rounds_to_minor_unit(minor: i64, pct: u32, expected: i64) {
        assert_eq!(Money::from_minor(minor).percent(pct), Money::from_minor(expected));
    }

    #[test]
    fn test_scale_package_weekend_example() {
        let weekend = Multiplier::from_f64(1.2).unwrap();
        let total = scale(Money::from_major(100), &[Multiplier::ONE, weekend], 2);
        assert_eq!(total, Money::from_major(240));
    }

    #[test]
    fn test_scale_rounds_only_once_at_the_end() {
        // 10.00 * 1.05 * 1.05 = 11.025; rounding after each step would give 12
        let factor = Multiplier::from_f64(1.05).unwrap();
        let total = scale(Money::from_major(10), &[factor, factor], 1);
        assert_eq!(total, Money::from_major(11));
    }

    #[test]
    fn test_scale_without_multipliers_keeps_minor_units() {
        let total = scale(Money::from_minor(8_999), &[Multiplier::ONE], 3);
        assert_eq!(total, Money::from_minor(26_997));
    }

    #[test]
    fn test_multiplier_from_f64_rejects_invalid() {
        assert!(Multiplier::from_f64(-0.5).is_none());
        assert!(Multiplier::from_f64(f64::NAN).is_none());
        assert_eq!(Multiplier::from_f64(1.2), Some(Multiplier::from_basis_points(12_000)));
    }

    #[test]
    fn test_multiplier_apply_tax() {
        let tax = Multiplier::from_basis_points(1_000);
        assert_eq!(tax.apply(Money::from_minor(24_050)), Money::from_minor(2_405));
    }
}
