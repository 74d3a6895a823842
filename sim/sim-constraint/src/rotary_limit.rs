//! Relative angle limits.

use sim_types::{Body, BodyId};

use crate::constraint::{
    apply_angular_impulses, effective_angular_mass, relative_angular_velocity, Constraint,
    ConstraintParams,
};
use crate::limits::{JointLimits, LimitState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Keeps `b.angle - a.angle` inside `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RotaryLimitJoint {
    body_a: BodyId,
    body_b: BodyId,
    params: ConstraintParams,

    limits: JointLimits,

    i_sum: f64,
    bias: f64,
    j_max: f64,

    j_acc: f64,
}

impl RotaryLimitJoint {
    /// Create a rotary limit. `min` and `max` are swapped if reversed.
    #[must_use]
    pub fn new(a: BodyId, b: BodyId, min: f64, max: f64) -> Self {
        Self {
            body_a: a,
            body_b: b,
            params: ConstraintParams::default(),
            limits: JointLimits::new(min, max),
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

    /// Get the minimum relative angle.
    #[must_use]
    pub fn min(&self) -> f64 {
        self.limits.min()
    }

    /// Get the maximum relative angle.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.limits.max()
    }

    /// Get the angle limits.
    #[must_use]
    pub fn limits(&self) -> &JointLimits {
        &self.limits
    }

    /// Set the minimum relative angle.
    pub fn set_min(&mut self, min: f64) {
        self.limits.set_min(min);
    }

    /// Set the maximum relative angle.
    pub fn set_max(&mut self, max: f64) {
        self.limits.set_max(max);
    }
}

impl Constraint for RotaryLimitJoint {
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
        let dist = b.angle() - a.angle();
        let pdist = match self.limits.state(dist) {
            LimitState::AboveMax(excess) => -excess,
            LimitState::BelowMin(deficit) => deficit,
            LimitState::Free => 0.0,
        };

        self.i_sum = effective_angular_mass(a, b);
        self.bias = self.params.bias_velocity(pdist, dt);
        self.j_max = self.params.max_impulse(dt);

        if self.bias == 0.0 {
            self.j_acc = 0.0;
        }
    }

    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        self.j_acc *= dt_coef;
        apply_angular_impulses(a, b, self.j_acc);
    }

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        if self.bias == 0.0 {
            return;
        }

        let wr = relative_angular_velocity(a, b);

        let j = -(self.bias + wr) * self.i_sum;
        let j_old = self.j_acc;
        self.j_acc = if self.bias < 0.0 {
            (j_old + j).clamp(0.0, self.j_max)
        } else {
            (j_old + j).clamp(-self.j_max, 0.0)
        };
        let j = self.j_acc - j_old;

        apply_angular_impulses(a, b, j);
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

    const DT: f64 = 1.0 / 60.0;

    fn run(joint: &mut RotaryLimitJoint, a: &mut Body, b: &mut Body) {
        joint.pre_step(a, b, DT);
        joint.apply_cached_impulse(a, b, 1.0);
        for _ in 0..10 {
            joint.apply_impulse(a, b);
        }
    }

    #[test]
    fn test_free_inside_limits() {
        let mut a = Body::new_static();
        let mut b = Body::new(1.0, 1.0)
            .with_angle(0.2)
            .with_velocity(nalgebra::Vector2::zeros(), 5.0);
        let mut joint = RotaryLimitJoint::new(BodyId::new(0), BodyId::new(1), -0.5, 0.5);
        joint.j_acc = -1.0;

        run(&mut joint, &mut a, &mut b);

        assert_eq!(joint.impulse(), 0.0);
        assert_eq!(b.angular_velocity, 5.0);
    }

    #[test]
    fn test_pushes_back_above_max() {
        let mut a = Body::new_static();
        let mut b = Body::new(1.0, 1.0).with_angle(0.6);
        let mut joint = RotaryLimitJoint::new(BodyId::new(0), BodyId::new(1), -0.5, 0.5);

        run(&mut joint, &mut a, &mut b);

        // 10% of 0.1 rad per 1/60 s step
        assert_relative_eq!(b.angular_velocity, -0.6, epsilon = 1e-9);
        assert!(joint.j_acc <= 0.0);
    }

    #[test]
    fn test_pushes_back_below_min() {
        let mut a = Body::new_static();
        let mut b = Body::new(1.0, 1.0)
            .with_angle(-0.6)
            .with_velocity(nalgebra::Vector2::zeros(), -2.0);
        let mut joint = RotaryLimitJoint::new(BodyId::new(0), BodyId::new(1), -0.5, 0.5);

        run(&mut joint, &mut a, &mut b);

        assert_relative_eq!(b.angular_velocity, 0.6, epsilon = 1e-9);
        assert!(joint.j_acc >= 0.0);
    }

    #[test]
    fn test_does_not_pull_toward_limit() {
        let mut a = Body::new_static();
        // Above max but already moving back faster than the bias asks.
        let mut b = Body::new(1.0, 1.0)
            .with_angle(0.6)
            .with_velocity(nalgebra::Vector2::zeros(), -3.0);
        let mut joint = RotaryLimitJoint::new(BodyId::new(0), BodyId::new(1), -0.5, 0.5);

        run(&mut joint, &mut a, &mut b);

        assert_eq!(joint.impulse(), 0.0);
        assert_eq!(b.angular_velocity, -3.0);
    }
}
