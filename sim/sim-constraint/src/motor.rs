//! Constant relative spin.

use sim_types::{Body, BodyId};

use crate::constraint::{
    apply_angular_impulses, effective_angular_mass, relative_angular_velocity, Constraint,
    ConstraintParams,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Drives `a.w - b.w` toward `rate`, limited only by `max_force`.
///
/// There is no positional error, so the bias parameters have no effect.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimpleMotor {
    body_a: BodyId,
    body_b: BodyId,
    params: ConstraintParams,

    rate: f64,

    i_sum: f64,
    j_max: f64,

    j_acc: f64,
}

impl SimpleMotor {
    /// Create a motor spinning `a` relative to `b` at `rate` rad/s.
    #[must_use]
    pub fn new(a: BodyId, b: BodyId, rate: f64) -> Self {
        Self {
            body_a: a,
            body_b: b,
            params: ConstraintParams::default(),
            rate,
            i_sum: 0.0,
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

    /// Get the target rate.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Set the target rate.
    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
    }
}

impl Constraint for SimpleMotor {
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
        self.i_sum = effective_angular_mass(a, b);
        self.j_max = self.params.max_impulse(dt);
    }

    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        self.j_acc *= dt_coef;
        apply_angular_impulses(a, b, self.j_acc);
    }

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        let wr = relative_angular_velocity(a, b) + self.rate;

        let j = -wr * self.i_sum;
        let j_old = self.j_acc;
        self.j_acc = (j_old + j).clamp(-self.j_max, self.j_max);
        let j = self.j_acc - j_old;

        apply_angular_impulses(a, b, j);
    }

    fn impulse(&self) -> f64 {
        self.j_acc.abs()
    }
}
