//! Fixed angular velocity ratio between two bodies.

use sim_types::{Body, BodyId};
use tracing::warn;

use crate::constraint::{inverse_or_zero, Constraint, ConstraintParams};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Locks `b.angle * ratio - a.angle` to `phase`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GearJoint {
    body_a: BodyId,
    body_b: BodyId,
    params: ConstraintParams,

    phase: f64,
    ratio: f64,
    ratio_inv: f64,

    i_sum: f64,
    bias: f64,
    j_max: f64,

    j_acc: f64,
}

impl GearJoint {
    /// Create a gear joint.
    ///
    /// A zero ratio is degenerate: it is accepted, but logged.
    #[must_use]
    pub fn new(a: BodyId, b: BodyId, phase: f64, ratio: f64) -> Self {
        if ratio == 0.0 {
            warn!(body_a = %a, body_b = %b, "gear joint with zero ratio");
        }

        Self {
            body_a: a,
            body_b: b,
            params: ConstraintParams::default(),
            phase,
            ratio,
            ratio_inv: inverse_or_zero(ratio),
            i_sum: 0.0,
            bias: 0.0,
            j_max: 0.0,
            j_acc: 0.0,
        }
    }

    /// Replace the constraint parameters.
    #[must_use]
    pub fn with_params(mut self, params: ConstraintParams) -> Self {
        self.params = params;
        self
    }

    /// Get the phase offset.
    #[must_use]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Get the gear ratio.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Set the phase offset.
    pub fn set_phase(&mut self, phase: f64) {
        self.phase = phase;
    }

    /// Set the gear ratio.
    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio;
        self.ratio_inv = inverse_or_zero(ratio);
    }

    fn apply(&self, a: &mut Body, b: &mut Body, j: f64) {
        a.angular_velocity -= j * a.inv_moment() * self.ratio_inv;
        b.angular_velocity += j * b.inv_moment();
    }
}

impl Constraint for GearJoint {
    fn bodies(&self) -> (BodyId, BodyId) {
        (self.body_a, self.body_b)
    }

    fn params(&self) -> &ConstraintParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ConstraintParams {
        &mut self.params
    }

    fn pre_step(&mut self, a: &Body, b: &Body, dt: f64) {
        self.i_sum =
            inverse_or_zero(a.inv_moment() * self.ratio_inv + self.ratio * b.inv_moment());

        let error = b.angle() * self.ratio - a.angle() - self.phase;
        self.bias = self.params.bias_velocity(error, dt);
        self.j_max = self.params.max_impulse(dt);
    }

    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        self.j_acc *= dt_coef;
        self.apply(a, b, self.j_acc);
    }

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        let wr = b.angular_velocity * self.ratio - a.angular_velocity;

        let j = (self.bias - wr) * self.i_sum;
        let j_old = self.j_acc;
        self.j_acc = (j_old + j).clamp(-self.j_max, self.j_max);
        let j = self.j_acc - j_old;

        self.apply(a, b, j);
    }

    fn impulse(&self) -> f64 {
        self.j_acc.abs()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_locks_angular_ratio() {
        let mut a = Body::new(1.0, 1.0).with_velocity(nalgebra::Vector2::zeros(), 3.0);
        let mut b = Body::new(1.0, 2.0);
        let mut joint = GearJoint::new(BodyId::new(0), BodyId::new(1), 0.0, 2.0);

        joint.pre_step(&a, &b, 1.0 / 60.0);
        for _ in 0..10 {
            joint.apply_impulse(&mut a, &mut b);
        }

        assert_relative_eq!(
            b.angular_velocity * 2.0,
            a.angular_velocity,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_set_ratio_keeps_inverse() {
        let mut joint = GearJoint::new(BodyId::new(0), BodyId::new(1), 0.0, 2.0);
        assert_relative_eq!(joint.ratio_inv, 0.5);

        joint.set_ratio(-4.0);
        assert_eq!(joint.ratio(), -4.0);
        assert_relative_eq!(joint.ratio_inv, -0.25);
    }

    #[test]
    fn test_zero_ratio_stays_finite() {
        let mut a = Body::new(1.0, 1.0).with_angle(1.0);
        let mut b = Body::new(1.0, 1.0);
        let mut joint = GearJoint::new(BodyId::new(0), BodyId::new(1), 0.0, 0.0);

        joint.pre_step(&a, &b, 1.0 / 60.0);
        joint.apply_impulse(&mut a, &mut b);

        assert!(a.is_finite() && b.is_finite());
    }
}
