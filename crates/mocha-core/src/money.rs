//! # Money Module
//!
//! Provides the `Money` type for monetary values.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PRICES ARE INTEGERS, QUANTITIES ARE NOT                                │
//! │                                                                         │
//! │  Sale price of an M latte:     45,000   (exact, integer)               │
//! │  Cost of 18 g of beans:        18 g ÷ 500 g/bag × 120,000 = 4,320      │
//! │  Cost of 7.5 ml of syrup:      7.5 ml × 213.4/ml = 1,600.5  (fraction!)│
//! │                                                                         │
//! │  Money is stored in the smallest currency unit (i64).                  │
//! │  Fractional intermediates (quantity × unit cost) are computed as f64   │
//! │  and rounded ONCE at the end with `Money::from_f64_rounded`.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mocha_core::money::Money;
//!
//! let price = Money::from_minor(45_000);
//! let line = price * 2_u32;
//! assert_eq!(line.minor(), 90_000);
//!
//! let ten_percent = Money::from_minor(100_000).percentage(10.0);
//! assert_eq!(ten_percent.minor(), 10_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: differences (profit, discount deltas) may be negative
/// - **Single field tuple struct**: serializes as a plain JSON number
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Rounds a fractional amount of minor units (half away from zero).
    ///
    /// Non-finite input yields zero; callers validate quantities before they
    /// reach this point.
    ///
    /// ```rust
    /// use mocha_core::money::Money;
    ///
    /// assert_eq!(Money::from_f64_rounded(1600.5).minor(), 1601);
    /// assert_eq!(Money::from_f64_rounded(1600.49).minor(), 1600);
    /// ```
    pub fn from_f64_rounded(amount: f64) -> Self {
        if !amount.is_finite() {
            return Money::zero();
        }
        Money(amount.round() as i64)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns the value as `f64`, for fractional intermediates only.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by an item quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns `percent`% of this amount, rounded.
    ///
    /// ## Example
    /// ```rust
    /// use mocha_core::money::Money;
    ///
    /// let total = Money::from_minor(85_000);
    /// assert_eq!(total.percentage(15.0).minor(), 12_750);
    /// ```
    pub fn percentage(&self, percent: f64) -> Money {
        Money::from_f64_rounded(self.as_f64() * percent / 100.0)
    }

    /// Subtracts without going below zero.
    #[inline]
    pub fn saturating_sub(self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows the amount with thousands separators, e.g. `100,000`.
///
/// For logs and debugging; currency symbols and locale formatting are the
/// frontend's job.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        if self.0 < 0 {
            write!(f, "-{}", grouped)
        } else {
            write!(f, "{}", grouped)
        }
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by a cart quantity.
impl Mul<u32> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: u32) -> Self {
        Money(self.0 * qty as i64)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
