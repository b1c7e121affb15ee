//! Fixed-point money type.
//!
//! # Motivation
//!
//! All monetary amounts in this system — balances, order sizes, prices,
//! fees — use a 1e-6 (micros) fixed-point representation stored as `i64`.
//! Using raw `i64` for money is error-prone: it allows accidental arithmetic
//! with unrelated integers (step indices, order IDs, basis points) without
//! any compile-time signal.
//!
//! `Micros` wraps the raw `i64` so the type system prevents:
//! - Implicit construction from raw `i64` (no `From<i64>` impl).
//! - Mixing `Micros` with unrelated `i64` values in arithmetic.
//!
//! # Scale
//!
//! 1 unit of any currency = 1_000_000 Micros.  Prices are quote-per-whole-
//! base-unit at the same scale, so a product of a size and a price needs one
//! rescale: `size * price / 1_000_000`, computed in `i128`.
//!
//! # Rounding
//!
//! [`Micros::checked_mul_price`] and [`Micros::checked_fee_bps`] truncate
//! toward zero.  Truncation is applied once, at placement time, and the
//! truncated totals are stored on the order — fills and refunds reuse the
//! stored totals, so rounding can never break conservation.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

// ---------------------------------------------------------------------------
// Micros newtype
// ---------------------------------------------------------------------------

/// A fixed-point currency amount at 1e-6 scale (micros).
///
/// 1 USD = `Micros(1_000_000)`; 0.5 BTC = `Micros(500_000)`.
///
/// # Construction
///
/// Use [`Micros::new`] for explicit construction from a raw micros value and
/// [`Micros::from_whole`] for whole currency units.  There is intentionally
/// no `From<i64>` implementation — callers must be deliberate about when a
/// raw integer represents a monetary amount.
///
/// # Retrieval
///
/// Use [`Micros::raw`] to extract the underlying `i64` when crossing crate
/// or layer boundaries that require raw integers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Micros(i64);

impl Micros {
    /// Zero amount.
    pub const ZERO: Micros = Micros(0);

    /// Maximum representable value.
    pub const MAX: Micros = Micros(i64::MAX);

    /// Minimum representable value.
    pub const MIN: Micros = Micros(i64::MIN);

    /// Scale factor: micros per whole currency unit.
    pub const PER_UNIT: i64 = 1_000_000;

    /// Construct a `Micros` from a raw `i64` at 1e-6 scale.
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    /// Construct from whole currency units (`Micros::from_whole(3)` = 3.0).
    #[inline]
    pub const fn from_whole(units: i64) -> Self {
        Micros(units * Self::PER_UNIT)
    }

    /// Extract the underlying raw `i64`.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Saturating addition — clamps at [`Micros::MAX`] on overflow.
    #[inline]
    pub fn saturating_add(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction — clamps at [`Micros::MIN`] on underflow.
    #[inline]
    pub fn saturating_sub(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_sub(rhs.0))
    }

    /// `true` if this amount is strictly positive.
    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// `true` if this amount is strictly negative.
    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Multiply a base-currency size by a quote-per-base price.
    ///
    /// Both operands are at 1e-6 scale, so the `i128` product is divided by
    /// [`Micros::PER_UNIT`] once (truncating toward zero).  Returns `None`
    /// if the rescaled product does not fit in `i64`.  Callers MUST handle
    /// `None` explicitly; overflow in a trade-value calculation is a
    /// critical error, not a routine saturation.
    #[inline]
    pub fn checked_mul_price(self, price: Micros) -> Option<Micros> {
        let product = (self.0 as i128) * (price.0 as i128) / (Self::PER_UNIT as i128);
        if product > i64::MAX as i128 || product < i64::MIN as i128 {
            None
        } else {
            Some(Micros(product as i64))
        }
    }

    /// Proportional fee on this amount, in basis points (1 bps = 0.01%).
    ///
    /// Truncates toward zero.  Returns `None` on `i64` overflow or a
    /// negative rate.
    #[inline]
    pub fn checked_fee_bps(self, rate_bps: i64) -> Option<Micros> {
        if rate_bps < 0 {
            return None;
        }
        let fee = (self.0 as i128) * (rate_bps as i128) / 10_000;
        if fee > i64::MAX as i128 || fee < i64::MIN as i128 {
            None
        } else {
            Some(Micros(fee as i64))
        }
    }

    /// Parse a decimal string ("102.5", "-0.000001", "7") into micros
    /// exactly, with no float round-trip.
    ///
    /// Returns `None` for malformed input, more than six fractional digits,
    /// or overflow.
    pub fn parse_decimal(s: &str) -> Option<Micros> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        if digits.is_empty() {
            return None;
        }

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if frac_part.len() > 6 {
            return None;
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }

        let int_units: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };

        let mut frac_micros: i64 = 0;
        if !frac_part.is_empty() {
            frac_micros = frac_part.parse().ok()?;
            for _ in frac_part.len()..6 {
                frac_micros *= 10;
            }
        }

        let magnitude = int_units
            .checked_mul(Self::PER_UNIT)?
            .checked_add(frac_micros)?;
        Some(Micros(if negative { -magnitude } else { magnitude }))
    }
}

// ---------------------------------------------------------------------------
// Arithmetic operators (closed over Micros)
// ---------------------------------------------------------------------------

impl Add for Micros {
    type Output = Micros;
    #[inline]
    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0 + rhs.0)
    }
}

impl Sub for Micros {
    type Output = Micros;
    #[inline]
    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0 - rhs.0)
    }
}

impl Neg for Micros {
    type Output = Micros;
    #[inline]
    fn neg(self) -> Micros {
        Micros(-self.0)
    }
}

impl AddAssign for Micros {
    #[inline]
    fn add_assign(&mut self, rhs: Micros) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Micros {
    #[inline]
    fn sub_assign(&mut self, rhs: Micros) {
        self.0 -= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl std::fmt::Display for Micros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = self.0 / Self::PER_UNIT;
        let frac = (self.0 % Self::PER_UNIT).abs();
        // When |value| < 1 unit and value is negative, `units` truncates to
        // 0, losing the sign.  Emit "-0" explicitly in that case.
        if self.0 < 0 && units == 0 {
            write!(f, "-{units}.{frac:06}")
        } else {
            write!(f, "{units}.{frac:06}")
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
