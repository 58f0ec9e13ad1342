//! Floating-point tolerance shared by every fill and identity decision.
//!
//! Balances and amounts are plain `f64`, so "zero" and "equal" always mean
//! "within [`EPSILON`]". Keep every comparison going through these helpers so
//! the exchange and the strategies never disagree about whether an order is
//! done.

/// Absolute tolerance for zero / equality tests.
pub const EPSILON: f64 = 1e-5;

/// `true` if `a` lies strictly inside `(-EPSILON, EPSILON)`.
#[inline]
pub fn is_zero(a: f64) -> bool {
    -EPSILON < a && a < EPSILON
}

/// `true` if `a` and `b` differ by less than [`EPSILON`].
#[inline]
pub fn is_near(a: f64, b: f64) -> bool {
    is_zero(a - b)
}
