//! # Quantity Module
//!
//! Provides the `Quantity` type for stock and sale-line amounts.
//!
//! ## Why Integer Thousandths?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ONE TYPE, THREE MEASURE UNITS                                          │
//! │                                                                         │
//! │  unidad   3 units      → Quantity(3000)   (always whole)                │
//! │  paquete  2 packages   → Quantity(2000)   (always whole)                │
//! │  kg       1.250 kg     → Quantity(1250)   (gram precision)              │
//! │                                                                         │
//! │  Same reasoning as Money: weights never touch floating point, and      │
//! │  summing Operation history is exact.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use almacen_core::quantity::Quantity;
//!
//! let units = Quantity::from_whole(10);
//! assert_eq!(units.whole(), Some(10));
//!
//! let weight = Quantity::from_thousandths(1_250); // 1.250 kg
//! assert_eq!(weight.whole(), None);
//! assert_eq!(weight.to_string(), "1.250");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

/// Thousandths per whole measure unit.
pub const QUANTITY_SCALE: i64 = 1_000;

/// An amount of stock in thousandths of its measure unit.
///
/// Signed so that intermediate arithmetic can detect underflow; values
/// persisted as stock are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    /// Creates a quantity from a whole number of units, packages or kilograms.
    #[inline]
    pub const fn from_whole(n: i64) -> Self {
        Quantity(n * QUANTITY_SCALE)
    }

    /// Creates a quantity from thousandths (grams when the unit is kg).
    #[inline]
    pub const fn from_thousandths(n: i64) -> Self {
        Quantity(n)
    }

    /// Returns the raw value in thousandths.
    #[inline]
    pub const fn thousandths(&self) -> i64 {
        self.0
    }

    /// Returns the whole count if this quantity has no fractional part.
    ///
    /// ## Example
    /// ```rust
    /// use almacen_core::quantity::Quantity;
    ///
    /// assert_eq!(Quantity::from_whole(4).whole(), Some(4));
    /// assert_eq!(Quantity::from_thousandths(4_500).whole(), None);
    /// ```
    #[inline]
    pub const fn whole(&self) -> Option<i64> {
        if self.0 % QUANTITY_SCALE == 0 {
            Some(self.0 / QUANTITY_SCALE)
        } else {
            None
        }
    }

    /// Returns true if this quantity has no fractional part.
    #[inline]
    pub const fn is_whole(&self) -> bool {
        self.0 % QUANTITY_SCALE == 0
    }

    /// Returns zero quantity.
    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is greater than zero.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is less than zero.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Clamps negative values to zero.
    ///
    /// Only credit paths use this; reservations report shortfalls instead.
    #[inline]
    pub const fn clamp_non_negative(&self) -> Self {
        if self.0 < 0 {
            Quantity(0)
        } else {
            *self
        }
    }
}

/// Shows whole quantities without decimals and fractional ones with three.
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.whole() {
            Some(n) => write!(f, "{}", n),
            None => {
                let sign = if self.0 < 0 { "-" } else { "" };
                let abs = self.0.abs();
                write!(
                    f,
                    "{}{}.{:03}",
                    sign,
                    abs / QUANTITY_SCALE,
                    abs % QUANTITY_SCALE
                )
            }
        }
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::zero()
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl SubAssign for Quantity {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), |acc, q| acc + q)
    }
}

impl<'a> Sum<&'a Quantity> for Quantity {
    fn sum<I: Iterator<Item = &'a Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), |acc, q| acc + *q)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
