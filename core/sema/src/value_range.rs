//! Value Range Propagation
//!
//! Every integer or boolean expression carries the inclusive interval its
//! value provably lies in. Ranges are always expressed in the representation
//! of the type they belong to: unsigned types use [`ValueRange::Unsigned`],
//! signed types [`ValueRange::Signed`], and `Bool` is the unsigned `[0, 1]`.
//!
//! Arithmetic is computed in 128 bits and brought back into the destination
//! type explicitly. Unsigned wraparound is modelled by subtracting or adding
//! the modulus, never by relying on host overflow. Signed overflow is
//! undefined: a bound that overflows on one side is clamped, and an operation
//! that overflows on every input is reported as [`UndefinedBehavior`].

use std::fmt::{self, Display, Formatter};

use tracing::trace;

use crate::errors::{UndefinedBehavior, UndefinedBehaviorKind, ice};
use crate::static_type::{ScalarKind, ScalarType, StaticType};

/// Result of a range transform: either a sound range or proof of undefined
/// behaviour.
pub type VrpResult = Result<ValueRange, UndefinedBehavior>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ValueRange {
    Unsigned { min: u64, max: u64 },
    Signed { min: i64, max: i64 },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Comparison {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ValueRange {
    #[must_use]
    pub fn unsigned(min: u64, max: u64) -> Self {
        if min > max {
            ice!("unsigned range [{min}, {max}] has min above max");
        }
        ValueRange::Unsigned { min, max }
    }

    #[must_use]
    pub fn signed(min: i64, max: i64) -> Self {
        if min > max {
            ice!("signed range [{min}, {max}] has min above max");
        }
        ValueRange::Signed { min, max }
    }

    /// The full representable range of `ty`, if it is integral or boolean.
    #[must_use]
    pub fn full(ty: &StaticType) -> Option<Self> {
        ty.as_scalar().and_then(Self::full_scalar)
    }

    #[must_use]
    pub fn full_scalar(scalar: &ScalarType) -> Option<Self> {
        match scalar.kind() {
            ScalarKind::Void => None,
            ScalarKind::Bool => Some(ValueRange::Unsigned { min: 0, max: 1 }),
            ScalarKind::SignedInt | ScalarKind::UnsignedInt | ScalarKind::Char => {
                let (min, max) = bounds(scalar);
                Some(from_bounds(scalar, min, max))
            }
        }
    }

    /// The degenerate range `[v, v]` of a literal of type `scalar`.
    #[must_use]
    pub fn literal(scalar: &ScalarType, value: i128) -> Self {
        from_bounds(scalar, value, value)
    }

    #[must_use]
    pub fn min(&self) -> i128 {
        match *self {
            ValueRange::Unsigned { min, .. } => i128::from(min),
            ValueRange::Signed { min, .. } => i128::from(min),
        }
    }

    #[must_use]
    pub fn max(&self) -> i128 {
        match *self {
            ValueRange::Unsigned { max, .. } => i128::from(max),
            ValueRange::Signed { max, .. } => i128::from(max),
        }
    }

    #[must_use]
    pub fn is_single_value(&self) -> bool {
        self.min() == self.max()
    }

    /// Numeric containment, independent of representation.
    #[must_use]
    pub fn contains(&self, other: &ValueRange) -> bool {
        self.min() <= other.min() && other.max() <= self.max()
    }

    #[must_use]
    pub fn contains_value(&self, value: i128) -> bool {
        self.min() <= value && value <= self.max()
    }

    /// Whether every value of the range is representable in `scalar`.
    #[must_use]
    pub fn fits_in(&self, scalar: &ScalarType) -> bool {
        ValueRange::full_scalar(scalar).is_some_and(|full| full.contains(self))
    }

    /// Smallest range containing both. Both ranges must share a representation.
    #[must_use]
    pub fn hull(&self, other: &ValueRange) -> ValueRange {
        match (*self, *other) {
            (ValueRange::Unsigned { min: a, max: b }, ValueRange::Unsigned { min: c, max: d }) => {
                ValueRange::Unsigned {
                    min: a.min(c),
                    max: b.max(d),
                }
            }
            (ValueRange::Signed { min: a, max: b }, ValueRange::Signed { min: c, max: d }) => {
                ValueRange::Signed {
                    min: a.min(c),
                    max: b.max(d),
                }
            }
            _ => ice!("hull of ranges with different representations: {self} and {other}"),
        }
    }

    /// Reinterprets the range as a value of type `dest`, wrapping modulo the
    /// destination width. Values that fit are preserved exactly; a range whose
    /// wrapped image is not contiguous widens to the full range of `dest`.
    #[must_use]
    pub fn convert(&self, dest: &ScalarType) -> ValueRange {
        if dest.kind() == ScalarKind::Bool {
            let min = i128::from(!self.contains_value(0));
            let max = i128::from(self.min() != 0 || self.max() != 0);
            return from_bounds(dest, min, max);
        }
        if self.fits_in(dest) {
            return from_bounds(dest, self.min(), self.max());
        }
        let (tmin, tmax) = bounds(dest);
        let modulus = tmax - tmin + 1;
        let span = self.max() - self.min();
        let wrap = |v: i128| (v - tmin).rem_euclid(modulus) + tmin;
        let (lo, hi) = (wrap(self.min()), wrap(self.max()));
        if span < modulus && lo <= hi {
            from_bounds(dest, lo, hi)
        } else {
            from_bounds(dest, tmin, tmax)
        }
    }
}

impl Display for ValueRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValueRange::Unsigned { min, max } => write!(f, "[{min}, {max}]"),
            ValueRange::Signed { min, max } => write!(f, "[{min}, {max}]"),
        }
    }
}

/// Representable bounds of an integral scalar. Characters are unsigned.
fn bounds(scalar: &ScalarType) -> (i128, i128) {
    let bits = scalar.bit_width().min(64);
    match scalar.kind() {
        ScalarKind::SignedInt => (-(1_i128 << (bits - 1)), (1_i128 << (bits - 1)) - 1),
        ScalarKind::UnsignedInt | ScalarKind::Char => (0, (1_i128 << bits) - 1),
        ScalarKind::Bool => (0, 1),
        ScalarKind::Void => ice!("`Void` has no value range"),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn from_bounds(scalar: &ScalarType, min: i128, max: i128) -> ValueRange {
    let (tmin, tmax) = bounds(scalar);
    if min < tmin || max > tmax {
        ice!(
            "range [{min}, {max}] escapes the bounds of `{}`",
            scalar.name()
        );
    }
    if scalar.is_signed() {
        ValueRange::signed(min as i64, max as i64)
    } else {
        ValueRange::unsigned(min as u64, max as u64)
    }
}

fn check_arithmetic(dest: &ScalarType) {
    if !matches!(
        dest.kind(),
        ScalarKind::SignedInt | ScalarKind::UnsignedInt
    ) {
        ice!("arithmetic range transform on `{}`", dest.name());
    }
}

/// Brings the exact interval `[lo, hi]` of an operation into `dest`.
///
/// Unsigned: an interval that lies entirely above (or below) the destination
/// wraps as a whole and stays exact; one that straddles a bound carries no
/// information and widens to the full range.
///
/// Signed: overflow on both sides in the same direction is undefined on every
/// input; partial overflow is clamped since the overflowing inputs are
/// undefined anyway.
fn settle(dest: &ScalarType, lo: i128, hi: i128) -> VrpResult {
    let (tmin, tmax) = bounds(dest);
    if dest.is_signed() {
        if lo > tmax {
            return Err(UndefinedBehavior {
                kind: UndefinedBehaviorKind::Overflow,
                collapsed: from_bounds(dest, tmax, tmax),
            });
        }
        if hi < tmin {
            return Err(UndefinedBehavior {
                kind: UndefinedBehaviorKind::Underflow,
                collapsed: from_bounds(dest, tmin, tmin),
            });
        }
        return Ok(from_bounds(dest, lo.max(tmin), hi.min(tmax)));
    }
    let modulus = tmax + 1;
    if lo >= 0 && hi <= tmax {
        Ok(from_bounds(dest, lo, hi))
    } else if lo > tmax && hi - modulus <= tmax {
        Ok(from_bounds(dest, lo - modulus, hi - modulus))
    } else if hi < 0 && lo + modulus >= 0 {
        Ok(from_bounds(dest, lo + modulus, hi + modulus))
    } else {
        Ok(from_bounds(dest, tmin, tmax))
    }
}

#[must_use = "the computed range must be attached to the expression"]
pub fn plus(dest: &ScalarType, lhs: &ValueRange, rhs: &ValueRange) -> VrpResult {
    check_arithmetic(dest);
    let result = settle(dest, lhs.min() + rhs.min(), lhs.max() + rhs.max());
    trace!(%lhs, %rhs, ?result, "plus");
    result
}

#[must_use = "the computed range must be attached to the expression"]
pub fn minus(dest: &ScalarType, lhs: &ValueRange, rhs: &ValueRange) -> VrpResult {
    check_arithmetic(dest);
    let result = settle(dest, lhs.min() - rhs.max(), lhs.max() - rhs.min());
    trace!(%lhs, %rhs, ?result, "minus");
    result
}

#[must_use = "the computed range must be attached to the expression"]
pub fn multiply(dest: &ScalarType, lhs: &ValueRange, rhs: &ValueRange) -> VrpResult {
    check_arithmetic(dest);
    // 64-bit unsigned corners can exceed `i128`. A saturated corner lies
    // outside every destination, so it still settles correctly.
    let corners = [
        lhs.min().saturating_mul(rhs.min()),
        lhs.min().saturating_mul(rhs.max()),
        lhs.max().saturating_mul(rhs.min()),
        lhs.max().saturating_mul(rhs.max()),
    ];
    let lo = corners.iter().copied().min().unwrap_or_default();
    let hi = corners.iter().copied().max().unwrap_or_default();
    let result = if dest.is_signed() {
        settle(dest, lo, hi)
    } else {
        // Products do not wrap as a contiguous block.
        let (tmin, tmax) = bounds(dest);
        if hi <= tmax {
            Ok(from_bounds(dest, lo, hi))
        } else {
            Ok(from_bounds(dest, tmin, tmax))
        }
    };
    trace!(%lhs, %rhs, ?result, "multiply");
    result
}

/// Unsigned division. A divisor that can only be zero is undefined; a
/// divisor range that merely includes zero is narrowed to start at one.
#[must_use = "the computed range must be attached to the expression"]
pub fn divide(dest: &ScalarType, lhs: &ValueRange, rhs: &ValueRange) -> VrpResult {
    check_arithmetic(dest);
    if dest.is_signed() {
        ice!("signed division has no range transform");
    }
    if rhs.max() == 0 {
        let (_, tmax) = bounds(dest);
        return Err(UndefinedBehavior {
            kind: UndefinedBehaviorKind::DivisionByZero,
            collapsed: from_bounds(dest, tmax, tmax),
        });
    }
    let divisor_min = rhs.min().max(1);
    let result = Ok(from_bounds(
        dest,
        lhs.min() / rhs.max(),
        lhs.max() / divisor_min,
    ));
    trace!(%lhs, %rhs, ?result, "divide");
    result
}

/// Boolean range of a comparison: `[1, 1]` when provably true, `[0, 0]` when
/// provably false, `[0, 1]` otherwise.
#[must_use]
pub fn compare(op: Comparison, lhs: &ValueRange, rhs: &ValueRange) -> ValueRange {
    let (always, never) = match op {
        Comparison::Equals => (
            lhs.is_single_value() && rhs.is_single_value() && lhs.min() == rhs.min(),
            lhs.max() < rhs.min() || rhs.max() < lhs.min(),
        ),
        Comparison::NotEquals => (
            lhs.max() < rhs.min() || rhs.max() < lhs.min(),
            lhs.is_single_value() && rhs.is_single_value() && lhs.min() == rhs.min(),
        ),
        Comparison::LessThan => (lhs.max() < rhs.min(), lhs.min() >= rhs.max()),
        Comparison::LessThanOrEqual => (lhs.max() <= rhs.min(), lhs.min() > rhs.max()),
        Comparison::GreaterThan => (lhs.min() > rhs.max(), lhs.max() <= rhs.min()),
        Comparison::GreaterThanOrEqual => (lhs.min() >= rhs.max(), lhs.max() < rhs.min()),
    };
    if always {
        ValueRange::Unsigned { min: 1, max: 1 }
    } else if never {
        ValueRange::Unsigned { min: 0, max: 0 }
    } else {
        ValueRange::Unsigned { min: 0, max: 1 }
    }
}

#[must_use]
pub fn logical_not(operand: &ValueRange) -> ValueRange {
    match *operand {
        ValueRange::Unsigned { min, max } if max <= 1 => ValueRange::Unsigned {
            min: 1 - max,
            max: 1 - min,
        },
        _ => ice!("logical not of non-boolean range {operand}"),
    }
}
