//! Elementwise helpers with explicit NaN and zero guards
//!
//! None of these ever panic or raise on empty bins; where a guard fails they
//! return the documented fallback instead.

use ndarray::{ArrayD, Zip};

/// `num / den` wherever `guard(den)` holds, `fallback` elsewhere.
///
/// Both arrays must have the same shape.
pub fn divide_where(
    num: &ArrayD<f64>,
    den: &ArrayD<f64>,
    fallback: f64,
    guard: impl Fn(f64) -> bool,
) -> ArrayD<f64> {
    Zip::from(num)
        .and(den)
        .map_collect(|&n, &d| if guard(d) { n / d } else { fallback })
}

/// Minimum that ignores a NaN operand (NaN only if both are NaN)
#[must_use]
pub fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() {
        b
    } else if b.is_nan() {
        a
    } else {
        a.min(b)
    }
}

/// Maximum that ignores a NaN operand (NaN only if both are NaN)
#[must_use]
pub fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() {
        b
    } else if b.is_nan() {
        a
    } else {
        a.max(b)
    }
}

/// Minimum that propagates NaN
#[must_use]
pub fn propagating_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

/// Maximum that propagates NaN
#[must_use]
pub fn propagating_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

/// Mean of the non-NaN values, `None` if there are none
pub fn nan_mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .filter(|v| !v.is_nan())
        .fold((0.0_f64, 0_usize), |(s, n), v| (s + v, n + 1));
    #[allow(clippy::cast_precision_loss)]
    (n > 0).then(|| sum / n as f64)
}

/// Replace negative rounding artifacts by zero, keeping NaN
#[must_use]
pub fn clamp_non_negative(x: f64) -> f64 {
    if x < 0.0 {
        0.0
    } else {
        x
    }
}
