//! One-way angular catch, like a socket wrench.

use sim_types::{Body, BodyId, BodySet, Result};
use tracing::warn;

use crate::constraint::{
    apply_angular_impulses, effective_angular_mass, relative_angular_velocity, Constraint,
    ConstraintParams,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lets the relative angle `b.angle - a.angle` advance freely in the
/// direction of `ratchet`, catching it every `ratchet` radians so it cannot
/// turn back.
///
/// A negative `ratchet` reverses the free direction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RatchetJoint {
    body_a: BodyId,
    body_b: BodyId,
    params: ConstraintParams,

    /// Current catch angle.
    angle: f64,
    phase: f64,
    ratchet: f64,

    i_sum: f64,
    bias: f64,
    j_max: f64,

    j_acc: f64,
}

impl RatchetJoint {
    /// Create a ratchet whose catch starts at the bodies' current relative
    /// angle.
    pub fn new(
        bodies: &BodySet,
        a: BodyId,
        b: BodyId,
        phase: f64,
        ratchet: f64,
    ) -> Result<Self> {
        let (body_a, body_b) = bodies.pair(a, b)?;

        if ratchet == 0.0 {
            warn!(body_a = %a, body_b = %b, "ratchet joint with zero increment never catches");
        }

        Ok(Self {
            body_a: a,
            body_b: b,
            params: ConstraintParams::default(),
            angle: body_b.angle() - body_a.angle(),
            phase,
            ratchet,
            i_sum: 0.0,
            bias: 0.0,
            j_max: 0.0,
            j_acc: 0.0,
        })
    }

    /// Replace the constraint parameters.
    #[must_use]
    pub fn with_params(mut self, params: ConstraintParams) -> Self {
        self.params = params;
        self
    }

    /// Get the current catch angle.
    #[must_use]
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Get the phase offset.
    #[must_use]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Get the ratchet increment.
    #[must_use]
    pub fn ratchet(&self) -> f64 {
        self.ratchet
    }

    /// Set the catch angle.
    pub fn set_angle(&mut self, angle: f64) {
        self.angle = angle;
    }

    /// Set the phase offset.
    pub fn set_phase(&mut self, phase: f64) {
        self.phase = phase;
    }

    /// Set the ratchet increment.
    pub fn set_ratchet(&mut self, ratchet: f64) {
        self.ratchet = ratchet;
    }
}

impl Constraint for RatchetJoint {
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
        let delta = b.angle() - a.angle();
        let diff = self.angle - delta;

        let pdist = if diff * self.ratchet > 0.0 {
            // Slipped back past the catch.
            diff
        } else {
            if self.ratchet != 0.0 {
                self.angle =
                    ((delta - self.phase) / self.ratchet).floor() * self.ratchet + self.phase;
            }
            0.0
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
        let ratchet = self.ratchet;

        let j = -(self.bias + wr) * self.i_sum;
        let j_old = self.j_acc;
        // Only push in the ratchet's direction.
        self.j_acc =
            ((j_old + j) * ratchet).clamp(0.0, self.j_max * ratchet.abs()) / ratchet;
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
    use std::f64::consts::FRAC_PI_2;

    const DT: f64 = 1.0 / 60.0;

    fn setup(b_angle: f64, b_spin: f64) -> (BodySet, BodyId, BodyId) {
        let mut bodies = BodySet::new();
        let a = bodies.insert(Body::new_static());
        let b = bodies.insert(
            Body::new(1.0, 1.0)
                .with_angle(b_angle)
                .with_velocity(nalgebra::Vector2::zeros(), b_spin),
        );
        (bodies, a, b)
    }

    fn step(joint: &mut RatchetJoint, bodies: &mut BodySet) {
        let (a, b) = joint.bodies();
        {
            let (body_a, body_b) = bodies.pair(a, b).unwrap();
            joint.pre_step(body_a, body_b, DT);
        }
        let (body_a, body_b) = bodies.pair_mut(a, b).unwrap();
        joint.apply_cached_impulse(body_a, body_b, 1.0);
        for _ in 0..10 {
            joint.apply_impulse(body_a, body_b);
        }
    }

    #[test]
    fn test_catch_starts_at_current_angle() {
        let (bodies, a, b) = setup(0.3, 0.0);
        let joint = RatchetJoint::new(&bodies, a, b, 0.0, FRAC_PI_2).unwrap();
        assert_relative_eq!(joint.angle(), 0.3);
    }

    #[test]
    fn test_free_direction_advances_catch() {
        let (mut bodies, a, b) = setup(0.0, 1.0);
        let mut joint = RatchetJoint::new(&bodies, a, b, 0.0, FRAC_PI_2).unwrap();

        bodies.get_mut(b).unwrap().set_angle(2.0);
        step(&mut joint, &mut bodies);

        // floor(2.0 / (pi/2)) * pi/2
        assert_relative_eq!(joint.angle(), FRAC_PI_2);
        assert_eq!(joint.impulse(), 0.0);
        assert_relative_eq!(bodies.get(b).unwrap().angular_velocity, 1.0);
    }

    #[test]
    fn test_blocks_reverse_direction() {
        let (mut bodies, a, b) = setup(0.0, -1.0);
        let mut joint = RatchetJoint::new(&bodies, a, b, 0.0, FRAC_PI_2).unwrap();
        joint.set_angle(0.0);

        bodies.get_mut(b).unwrap().set_angle(-0.1);
        step(&mut joint, &mut bodies);

        let body_b = bodies.get(b).unwrap();
        assert!(body_b.angular_velocity > 0.0);
        assert!(joint.j_acc >= 0.0);
        assert!(joint.angle() == 0.0);
    }

    #[test]
    fn test_inactive_resets_accumulated_impulse() {
        let (mut bodies, a, b) = setup(0.0, 0.0);
        let mut joint = RatchetJoint::new(&bodies, a, b, 0.0, FRAC_PI_2).unwrap();
        joint.j_acc = 5.0;

        bodies.get_mut(b).unwrap().set_angle(0.5);
        step(&mut joint, &mut bodies);

        assert_eq!(joint.impulse(), 0.0);
        assert_eq!(bodies.get(b).unwrap().angular_velocity, 0.0);
    }

    #[test]
    fn test_negative_ratchet_reverses_direction() {
        let (mut bodies, a, b) = setup(0.0, 1.0);
        let mut joint = RatchetJoint::new(&bodies, a, b, 0.0, -FRAC_PI_2).unwrap();

        bodies.get_mut(b).unwrap().set_angle(0.1);
        step(&mut joint, &mut bodies);

        assert!(bodies.get(b).unwrap().angular_velocity < 1.0);
        assert!(joint.j_acc <= 0.0);
    }
}
