//! Planar vector helpers shared by the solver kernels.
//!
//! nalgebra covers the general linear algebra; these are the handful of 2D
//! identities (scalar cross products, perpendiculars, length clamping) the
//! constraint formulations are written in terms of.

use nalgebra::Vector2;

/// 2D cross product `a.x * b.y - a.y * b.x`.
#[inline]
#[must_use]
pub fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a scalar (out-of-plane) with a vector: `w × v`.
#[inline]
#[must_use]
pub fn cross_scalar(w: f64, v: &Vector2<f64>) -> Vector2<f64> {
    Vector2::new(-w * v.y, w * v.x)
}

/// Counter-clockwise perpendicular `(-y, x)`.
#[inline]
#[must_use]
pub fn perp(v: &Vector2<f64>) -> Vector2<f64> {
    Vector2::new(-v.y, v.x)
}

/// Clockwise perpendicular `(y, -x)`.
#[inline]
#[must_use]
pub fn rperp(v: &Vector2<f64>) -> Vector2<f64> {
    Vector2::new(v.y, -v.x)
}

/// Projection of `v` onto `onto`. Returns zero when `onto` is zero.
#[inline]
#[must_use]
pub fn project(v: &Vector2<f64>, onto: &Vector2<f64>) -> Vector2<f64> {
    let len_sq = onto.norm_squared();
    if len_sq == 0.0 {
        Vector2::zeros()
    } else {
        onto * (v.dot(onto) / len_sq)
    }
}

/// Scale `v` down so its length does not exceed `max_len`.
///
/// An infinite `max_len` leaves the vector untouched.
#[inline]
#[must_use]
pub fn clamp_length(v: &Vector2<f64>, max_len: f64) -> Vector2<f64> {
    let len_sq = v.norm_squared();
    if len_sq > max_len * max_len {
        v * (max_len / len_sq.sqrt())
    } else {
        *v
    }
}

/// Unit vector along `v`, or the zero vector when `v` has zero length.
///
/// Zero length is treated as infinitely far away: the inverse length is
/// zero, so no NaN escapes into the solver.
#[inline]
#[must_use]
pub fn normalize_or_zero(v: &Vector2<f64>) -> Vector2<f64> {
    let len = v.norm();
    v * inverse_length(len)
}

/// `1 / len`, with zero length mapped to zero.
#[inline]
#[must_use]
pub fn inverse_length(len: f64) -> f64 {
    if len == 0.0 {
        0.0
    } else {
        1.0 / len
    }
}

/// Fraction of positional error corrected over a step of length `dt`.
///
/// `error_bias` is the fraction of error left uncorrected after one second,
/// so the per-step coefficient is `1 - error_bias^dt`.
#[inline]
#[must_use]
pub fn bias_coefficient(error_bias: f64, dt: f64) -> f64 {
    1.0 - error_bias.powf(dt)
}
