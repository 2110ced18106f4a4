//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A fiado balance compared against 0.30000000000000004 is never         │
//! │  "fully paid". Debts stay open forever by a rounding hair.             │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    monto_pagado >= total is an exact integer comparison                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use almacen_core::money::Money;
//! use almacen_core::quantity::Quantity;
//!
//! let price = Money::from_cents(1099); // $10.99
//!
//! let doubled = price + price;
//! assert_eq!(doubled.cents(), 2198);
//!
//! // 0.500 kg at $10.99/kg
//! let line = price.for_quantity(Quantity::from_thousandths(500));
//! assert_eq!(line.cents(), 550);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

use crate::quantity::{Quantity, QUANTITY_SCALE};

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents).
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  SaleItem.unit_price ──► SaleItem.subtotal ──► Sale.total              │
/// │                                                     │                   │
/// │                    Sale.amount_paid ◄── abonos ─────┤                   │
/// │                                                     │                   │
/// │                    Operation.amount ◄── voids ──────┘                   │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use almacen_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // Represents $10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Subtracts, flooring the result at zero.
    ///
    /// ## Example
    /// ```rust
    /// use almacen_core::money::Money;
    ///
    /// let total = Money::from_cents(500);
    /// assert_eq!(total.saturating_sub_to_zero(Money::from_cents(800)), Money::zero());
    /// ```
    #[inline]
    pub const fn saturating_sub_to_zero(&self, other: Money) -> Self {
        if self.0 > other.0 {
            Money(self.0 - other.0)
        } else {
            Money(0)
        }
    }

    /// Multiplies a unit price by a measured quantity.
    ///
    /// ## Rounding
    /// Whole quantities are exact. Fractional (kg) quantities round half up
    /// to the nearest cent: `(price × thousandths + 500) / 1000`.
    ///
    /// ## Example
    /// ```rust
    /// use almacen_core::money::Money;
    /// use almacen_core::quantity::Quantity;
    ///
    /// let per_kg = Money::from_cents(1999);
    /// // 0.333 kg × $19.99 = $6.65667 → $6.66
    /// assert_eq!(per_kg.for_quantity(Quantity::from_thousandths(333)).cents(), 666);
    /// ```
    pub fn for_quantity(&self, qty: Quantity) -> Money {
        self.checked_for_quantity(qty).unwrap_or(if (self.0 < 0) != qty.is_negative() {
            Money(i64::MIN)
        } else {
            Money(i64::MAX)
        })
    }

    /// Like [`Money::for_quantity`], but `None` when the line value does not
    /// fit in `i64` cents.
    ///
    /// ```rust
    /// use almacen_core::money::Money;
    /// use almacen_core::quantity::Quantity;
    ///
    /// assert!(Money::from_cents(i64::MAX).checked_for_quantity(Quantity::from_whole(2)).is_none());
    /// ```
    pub fn checked_for_quantity(&self, qty: Quantity) -> Option<Money> {
        // i128 so the intermediate product cannot overflow
        let scaled = self.0 as i128 * qty.thousandths() as i128;
        let half = (QUANTITY_SCALE / 2) as i128;
        let rounded = if scaled >= 0 {
            (scaled + half) / QUANTITY_SCALE as i128
        } else {
            (scaled - half) / QUANTITY_SCALE as i128
        };
        i64::try_from(rounded).ok().map(Money)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// ## Note
/// This is for logs and error messages. Frontends format for display.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.dollars(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "$0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_for_quantity_whole_is_exact() {
        let price = Money::from_cents(100);
        assert_eq!(price.for_quantity(Quantity::from_whole(5)).cents(), 500);
    }

    #[test]
    fn test_for_quantity_rounds_half_up() {
        // 0.005 kg × $1.00 = 0.5 cents → 1 cent
        let price = Money::from_cents(100);
        assert_eq!(price.for_quantity(Quantity::from_thousandths(5)).cents(), 1);
        // 0.004 kg × $1.00 = 0.4 cents → 0 cents
        assert_eq!(price.for_quantity(Quantity::from_thousandths(4)).cents(), 0);
    }

    #[test]
    fn test_overflow_is_detected() {
        let max = Money::from_cents(i64::MAX);
        assert_eq!(max.checked_add(Money::from_cents(1)), None);
        assert_eq!(max.checked_add(Money::zero()), Some(max));
        assert_eq!(max.checked_for_quantity(Quantity::from_whole(2)), None);
        assert_eq!(max.checked_for_quantity(Quantity::from_whole(1)), Some(max));
        assert_eq!(max + Money::from_cents(1), max);
    }

    #[test]
    fn test_saturating_sub_to_zero() {
        let a = Money::from_cents(300);
        assert_eq!(a.saturating_sub_to_zero(Money::from_cents(200)).cents(), 100);
        assert_eq!(a.saturating_sub_to_zero(Money::from_cents(900)).cents(), 0);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(Money::from_cents(100).is_positive());
        assert!(Money::from_cents(-100).is_negative());
    }
}
