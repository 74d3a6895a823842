//! The constraint contract and the impulse kernels shared by every joint.
//!
//! Each joint is solved with sequential impulses:
//!
//! ```text
//! pre_step(dt)              effective mass, bias velocity, impulse clamp
//! apply_cached_impulse(k)   re-apply last step's accumulated impulse * k
//! apply_impulse()  x N      delta = (bias - v_rel) * mass; clamp the total
//! ```
//!
//! Only the change in the clamped *total* impulse is applied on each
//! iteration, which is what lets repeated passes converge instead of
//! overshoot.

use nalgebra::{Matrix2, Vector2};
use sim_types::math::cross;
use sim_types::{Body, BodyId, Result, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Operations every joint, spring and motor implements.
///
/// The driver supplies the two bodies named by [`Constraint::bodies`], in
/// that order, to each call.
pub trait Constraint {
    /// The two bodies this constraint connects, `(a, b)`.
    fn bodies(&self) -> (BodyId, BodyId);

    /// Tunable force/bias parameters.
    fn params(&self) -> &ConstraintParams;

    /// Tunable force/bias parameters, mutably.
    fn params_mut(&mut self) -> &mut ConstraintParams;

    /// Recompute effective mass, bias velocity and impulse clamp for a step
    /// of length `dt`. Never touches body velocities.
    fn pre_step(&mut self, a: &Body, b: &Body, dt: f64);

    /// Re-apply the impulse accumulated on the previous step, scaled by
    /// `dt_coef = dt / prev_dt`.
    ///
    /// The stored total is scaled too, so it always equals what has been
    /// applied this step. A `dt_coef` of zero starts the step cold.
    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64);

    /// Run one sequential-impulse iteration.
    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body);

    /// Magnitude of the accumulated impulse from the most recent step.
    ///
    /// Divide by the step length to get the force the constraint applied.
    fn impulse(&self) -> f64;
}

/// Default error bias: 10% of the positional error is corrected per
/// 1/60 s step, i.e. `(1 - 0.1)^60` of it remains after one second.
#[must_use]
pub fn default_error_bias() -> f64 {
    0.9_f64.powi(60)
}

/// Force and bias limits shared by all constraint types.
///
/// # Example
///
/// ```
/// use sim_constraint::ConstraintParams;
///
/// let params = ConstraintParams::default().with_max_force(100.0);
/// assert_eq!(params.max_force(), 100.0);
/// assert!(params.max_bias().is_infinite());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstraintParams {
    /// Maximum force the constraint may apply (>= 0).
    max_force: f64,
    /// Maximum speed at which positional error is corrected (>= 0).
    max_bias: f64,
    /// Fraction of positional error left uncorrected after one second.
    error_bias: f64,
}

impl Default for ConstraintParams {
    fn default() -> Self {
        Self {
            max_force: f64::INFINITY,
            max_bias: f64::INFINITY,
            error_bias: default_error_bias(),
        }
    }
}

impl ConstraintParams {
    /// Set the maximum force. Negative values clamp to zero.
    #[must_use]
    pub fn with_max_force(mut self, max_force: f64) -> Self {
        self.set_max_force(max_force);
        self
    }

    /// Set the maximum bias velocity. Negative values clamp to zero.
    #[must_use]
    pub fn with_max_bias(mut self, max_bias: f64) -> Self {
        self.set_max_bias(max_bias);
        self
    }

    /// Set the error bias. Values are clamped into `[0, 1]`.
    #[must_use]
    pub fn with_error_bias(mut self, error_bias: f64) -> Self {
        self.set_error_bias(error_bias);
        self
    }

    /// Get the maximum force.
    #[must_use]
    pub fn max_force(&self) -> f64 {
        self.max_force
    }

    /// Get the maximum bias velocity.
    #[must_use]
    pub fn max_bias(&self) -> f64 {
        self.max_bias
    }

    /// Get the error bias.
    #[must_use]
    pub fn error_bias(&self) -> f64 {
        self.error_bias
    }

    /// Set the maximum force. Negative values clamp to zero.
    pub fn set_max_force(&mut self, max_force: f64) {
        self.max_force = max_force.max(0.0);
    }

    /// Set the maximum bias velocity. Negative values clamp to zero.
    pub fn set_max_bias(&mut self, max_bias: f64) {
        self.max_bias = max_bias.max(0.0);
    }

    /// Set the error bias. Values are clamped into `[0, 1]`.
    pub fn set_error_bias(&mut self, error_bias: f64) {
        self.error_bias = error_bias.clamp(0.0, 1.0);
    }

    /// Impulse clamp for a step of length `dt`.
    ///
    /// Never negative. A zero or negative `dt` gives zero, including with
    /// an infinite `max_force`.
    #[must_use]
    pub fn max_impulse(&self, dt: f64) -> f64 {
        // f64::max drops the NaN from `inf * 0`.
        (self.max_force * dt).max(0.0)
    }

    /// Bias velocity that removes `error` at the configured rate, clamped
    /// to `[-max_bias, max_bias]`. Zero when `dt <= 0`.
    #[must_use]
    pub fn bias_velocity(&self, error: f64, dt: f64) -> f64 {
        if dt.is_nan() || dt <= 0.0 {
            return 0.0;
        }
        let coef = sim_types::math::bias_coefficient(self.error_bias, dt);
        (-coef * error / dt).clamp(-self.max_bias, self.max_bias)
    }

    /// Vector form of [`ConstraintParams::bias_velocity`], clamped by length.
    #[must_use]
    pub fn bias_velocity_vector(&self, error: &Vector2<f64>, dt: f64) -> Vector2<f64> {
        if dt.is_nan() || dt <= 0.0 {
            return Vector2::zeros();
        }
        let coef = sim_types::math::bias_coefficient(self.error_bias, dt);
        sim_types::math::clamp_length(&(error * (-coef / dt)), self.max_bias)
    }

    /// Validate the parameters.
    ///
    /// The setters already clamp, so this only fails on NaN.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] if any parameter is NaN.
    pub fn validate(&self) -> Result<()> {
        if self.max_force.is_nan() || self.max_bias.is_nan() || self.error_bias.is_nan() {
            return Err(SimError::invalid_config("constraint parameters must not be NaN"));
        }
        Ok(())
    }
}

// ============================================================================
// Impulse kernels
// ============================================================================

/// Velocity of `b`'s anchor relative to `a`'s anchor.
#[inline]
pub(crate) fn relative_velocity(
    a: &Body,
    b: &Body,
    r1: &Vector2<f64>,
    r2: &Vector2<f64>,
) -> Vector2<f64> {
    b.velocity_at_offset(r2) - a.velocity_at_offset(r1)
}

/// Relative anchor velocity projected onto `n`.
#[inline]
pub(crate) fn normal_relative_velocity(
    a: &Body,
    b: &Body,
    r1: &Vector2<f64>,
    r2: &Vector2<f64>,
    n: &Vector2<f64>,
) -> f64 {
    relative_velocity(a, b, r1, r2).dot(n)
}

/// Apply `j` to `b` at `r2` and `-j` to `a` at `r1`.
#[inline]
pub(crate) fn apply_impulses(
    a: &mut Body,
    b: &mut Body,
    r1: &Vector2<f64>,
    r2: &Vector2<f64>,
    j: &Vector2<f64>,
) {
    a.apply_impulse(&-j, r1);
    b.apply_impulse(j, r2);
}

/// Apply an angular impulse `j` to `b` and `-j` to `a`.
#[inline]
pub(crate) fn apply_angular_impulses(a: &mut Body, b: &mut Body, j: f64) {
    a.angular_velocity -= j * a.inv_moment();
    b.angular_velocity += j * b.inv_moment();
}

/// Inverse mass seen along `n` at offset `r` of one body.
#[inline]
fn k_scalar_body(body: &Body, r: &Vector2<f64>, n: &Vector2<f64>) -> f64 {
    let rcn = cross(r, n);
    body.inv_mass() + body.inv_moment() * rcn * rcn
}

/// Combined inverse mass of the pair along direction `n`.
#[inline]
pub(crate) fn k_scalar(
    a: &Body,
    b: &Body,
    r1: &Vector2<f64>,
    r2: &Vector2<f64>,
    n: &Vector2<f64>,
) -> f64 {
    k_scalar_body(a, r1, n) + k_scalar_body(b, r2, n)
}

/// Effective mass of the pair along direction `n`.
#[inline]
pub(crate) fn effective_mass(
    a: &Body,
    b: &Body,
    r1: &Vector2<f64>,
    r2: &Vector2<f64>,
    n: &Vector2<f64>,
) -> f64 {
    inverse_or_zero(k_scalar(a, b, r1, r2, n))
}

/// Effective angular mass `1 / (i_inv_a + i_inv_b)`.
#[inline]
pub(crate) fn effective_angular_mass(a: &Body, b: &Body) -> f64 {
    inverse_or_zero(a.inv_moment() + b.inv_moment())
}

/// Inverse of the 2x2 point-to-point mass matrix.
///
/// `K = (m_a + m_b) I + i_a [r1]ᵀ[r1] + i_b [r2]ᵀ[r2]`, using the planar
/// skew form of each anchor offset.
pub(crate) fn effective_mass_tensor(
    a: &Body,
    b: &Body,
    r1: &Vector2<f64>,
    r2: &Vector2<f64>,
) -> Matrix2<f64> {
    let m_sum = a.inv_mass() + b.inv_mass();
    let mut k = Matrix2::new(m_sum, 0.0, 0.0, m_sum);

    for (i_inv, r) in [(a.inv_moment(), r1), (b.inv_moment(), r2)] {
        let xx = r.x * r.x * i_inv;
        let yy = r.y * r.y * i_inv;
        let nxy = -r.x * r.y * i_inv;
        k[(0, 0)] += yy;
        k[(0, 1)] += nxy;
        k[(1, 0)] += nxy;
        k[(1, 1)] += xx;
    }

    // Two immovable bodies: nothing to solve.
    k.try_inverse().unwrap_or_else(Matrix2::zeros)
}

/// Two immovable bodies produce a zero denominator; treat them as having
/// zero effective mass rather than dividing by zero.
#[inline]
pub(crate) fn inverse_or_zero(k: f64) -> f64 {
    if k == 0.0 {
        0.0
    } else {
        1.0 / k
    }
}

/// Angular velocity of `b` relative to `a`.
#[inline]
pub(crate) fn relative_angular_velocity(a: &Body, b: &Body) -> f64 {
    b.angular_velocity - a.angular_velocity
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    const DT_TEST: f64 = 1.0 / 60.0;

    #[test]
    fn test_default_params() {
        let params = ConstraintParams::default();
        assert!(params.max_force().is_infinite());
        assert!(params.max_bias().is_infinite());
        assert_relative_eq!(params.error_bias(), 0.9_f64.powi(60));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_clamp_negative_values() {
        let params = ConstraintParams::default()
            .with_max_force(-5.0)
            .with_max_bias(-1.0)
            .with_error_bias(2.0);
        assert_eq!(params.max_force(), 0.0);
        assert_eq!(params.max_bias(), 0.0);
        assert_eq!(params.error_bias(), 1.0);
        assert_eq!(params.max_impulse(1.0 / 60.0), 0.0);
    }

    #[test]
    fn test_bias_velocity_is_clamped() {
        let params = ConstraintParams::default().with_max_bias(0.5);
        let dt = 1.0 / 60.0;
        // 10% of 1.0 per step at 60Hz = 6 units/s, clamped to 0.5
        assert_relative_eq!(params.bias_velocity(1.0, dt), -0.5);
        assert_relative_eq!(params.bias_velocity(-1.0, dt), 0.5);

        let unclamped = ConstraintParams::default();
        assert_relative_eq!(unclamped.bias_velocity(1.0, dt), -6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_non_positive_dt_is_inert() {
        let params = ConstraintParams::default();
        assert_eq!(params.max_impulse(0.0), 0.0);
        assert_eq!(params.max_impulse(-DT_TEST), 0.0);
        assert_eq!(params.bias_velocity(1.0, 0.0), 0.0);
        assert_eq!(params.bias_velocity(1.0, -DT_TEST), 0.0);
        assert_eq!(
            params.bias_velocity_vector(&Vector2::new(1.0, -1.0), 0.0),
            Vector2::zeros()
        );
    }

    #[test]
    fn test_nan_params_rejected() {
        let mut params = ConstraintParams::default();
        params.max_force = f64::NAN;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_effective_mass_against_static() {
        let a = Body::new(2.0, 1.0);
        let b = Body::new_static();
        let n = Vector2::x();
        let mass = effective_mass(&a, &b, &Vector2::zeros(), &Vector2::zeros(), &n);
        assert_relative_eq!(mass, 2.0);
    }

    #[test]
    fn test_effective_mass_between_statics_is_zero() {
        let a = Body::new_static();
        let b = Body::new_static();
        let r = Vector2::new(1.0, 0.0);
        assert_eq!(effective_mass(&a, &b, &r, &r, &Vector2::y()), 0.0);
        assert_eq!(effective_mass_tensor(&a, &b, &r, &r), Matrix2::zeros());
    }

    #[test]
    fn test_mass_tensor_cancels_relative_velocity() {
        let a = Body::new(1.0, 0.5).with_velocity(Vector2::new(0.3, -0.2), 0.7);
        let b = Body::new(3.0, 2.0).with_velocity(Vector2::new(-1.0, 0.4), -0.1);
        let r1 = Vector2::new(0.5, 0.25);
        let r2 = Vector2::new(-0.75, 1.0);

        let k = effective_mass_tensor(&a, &b, &r1, &r2);
        let vr = relative_velocity(&a, &b, &r1, &r2);
        let j = k * (-vr);

        let (mut a, mut b) = (a, b);
        apply_impulses(&mut a, &mut b, &r1, &r2, &j);
        let after = relative_velocity(&a, &b, &r1, &r2);
        assert_relative_eq!(after.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_apply_impulses_conserves_momentum() {
        let mut a = Body::new(1.0, 1.0).with_position(Point2::new(-1.0, 0.0));
        let mut b = Body::new(2.0, 1.0).with_position(Point2::new(1.0, 0.0));
        let j = Vector2::new(1.0, 2.0);
        apply_impulses(&mut a, &mut b, &Vector2::zeros(), &Vector2::zeros(), &j);

        let momentum = a.linear_velocity * a.mass() + b.linear_velocity * b.mass();
        assert_relative_eq!(momentum.norm(), 0.0, epsilon = 1e-12);
    }
}
