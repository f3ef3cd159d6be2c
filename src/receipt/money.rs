//! Integer-cent money.
//!
//! Receipt arithmetic never touches floats after the boundary: prices are
//! converted to cents once, and tax is rounded to a whole cent once.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul};

/// Largest magnitude accepted from a float, in major units.
const MAX_MAJOR: f64 = 1e13;

/// Monetary value in the smallest currency unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Convert a decimal amount (e.g. `3.5`) to cents, rounding half away
    /// from zero. Returns `None` for NaN, infinities and absurd magnitudes.
    ///
    /// ```
    /// use blethermal::receipt::money::Money;
    ///
    /// assert_eq!(Money::from_decimal(3.5), Some(Money::from_cents(350)));
    /// assert_eq!(Money::from_decimal(0.105), Some(Money::from_cents(11)));
    /// assert_eq!(Money::from_decimal(f64::NAN), None);
    /// ```
    pub fn from_decimal(amount: f64) -> Option<Self> {
        if !amount.is_finite() || amount.abs() >= MAX_MAJOR {
            return None;
        }
        // Scale through a string-free path that survives 0.105 * 100 = 10.4999...
        let cents = (amount * 100.0 * 1e6).round() / 1e6;
        Some(Money(cents.round() as i64))
    }

    #[inline]
    pub const fn cents(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_mul(self, qty: u32) -> Option<Money> {
        self.0.checked_mul(qty as i64).map(Money)
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Apply a fractional rate, rounding to the nearest cent (half away from zero).
    ///
    /// ```
    /// use blethermal::receipt::money::Money;
    ///
    /// assert_eq!(Money::from_cents(700).apply_rate(0.08), Money::from_cents(56));
    /// assert_eq!(Money::from_cents(1250).apply_rate(0.13), Money::from_cents(163));
    /// ```
    pub fn apply_rate(self, rate: f64) -> Money {
        let scaled = (self.0 as f64 * rate * 1e6).round() / 1e6;
        Money(scaled.round() as i64)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Mul<u32> for Money {
    type Output = Money;

    fn mul(self, rhs: u32) -> Money {
        Money(self.0 * rhs as i64)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

/// Plain two-decimal rendering, no currency symbol.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let text = format!("{}{}.{:02}", sign, abs / 100, abs % 100);
        f.pad(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(756).to_string(), "7.56");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-150).to_string(), "-1.50");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_display_respects_width() {
        assert_eq!(format!("{:>7}", Money::from_cents(350)), "   3.50");
    }

    #[test]
    fn test_from_decimal_rounding() {
        assert_eq!(Money::from_decimal(3.50), Some(Money::from_cents(350)));
        assert_eq!(Money::from_decimal(19.99), Some(Money::from_cents(1999)));
        assert_eq!(Money::from_decimal(0.1 + 0.2), Some(Money::from_cents(30)));
        assert_eq!(Money::from_decimal(f64::INFINITY), None);
        assert_eq!(Money::from_decimal(1e14), None);
    }

    #[test]
    fn test_checked_arithmetic() {
        assert_eq!(
            Money::from_cents(350).checked_mul(2),
            Some(Money::from_cents(700))
        );
        assert_eq!(Money::from_cents(i64::MAX).checked_mul(2), None);
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, 5].into_iter().map(Money::from_cents).sum();
        assert_eq!(total, Money::from_cents(355));
    }
}
