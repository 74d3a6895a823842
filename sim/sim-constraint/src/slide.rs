//! Distance joint with a free range, like a chain or a telescoping rod.

use nalgebra::Vector2;
use sim_types::math::normalize_or_zero;
use sim_types::{Body, BodyId};

use crate::constraint::{
    apply_impulses, effective_mass, normal_relative_velocity, Constraint, ConstraintParams,
};
use crate::limits::{JointLimits, LimitState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Keeps the distance between two anchors inside `[min, max]`.
///
/// Inside the range the joint is inactive and its accumulated impulse is
/// dropped.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SlideJoint {
    body_a: BodyId,
    body_b: BodyId,
    params: ConstraintParams,

    anchor_a: Vector2<f64>,
    anchor_b: Vector2<f64>,
    limits: JointLimits,

    r1: Vector2<f64>,
    r2: Vector2<f64>,
    /// Zero while the distance is inside the limits.
    n: Vector2<f64>,
    n_mass: f64,
    bias: f64,
    jn_max: f64,

    jn_acc: f64,
}

impl SlideJoint {
    /// Create a slide joint. `min` and `max` are swapped if reversed.
    #[must_use]
    pub fn new(
        a: BodyId,
        b: BodyId,
        anchor_a: Vector2<f64>,
        anchor_b: Vector2<f64>,
        min: f64,
        max: f64,
    ) -> Self {
        Self {
            body_a: a,
            body_b: b,
            params: ConstraintParams::default(),
            anchor_a,
            anchor_b,
            limits: JointLimits::new(min, max),
            r1: Vector2::zeros(),
            r2: Vector2::zeros(),
            n: Vector2::zeros(),
            n_mass: 0.0,
            bias: 0.0,
            jn_max: 0.0,
            jn_acc: 0.0,
        }
    }

    /// Replace the constraint parameters.
    #[must_use]
    pub fn with_params(mut self, params: ConstraintParams) -> Self {
        self.params = params;
        self
    }

    /// Get the anchor on `a`.
    #[must_use]
    pub fn anchor_a(&self) -> Vector2<f64> {
        self.anchor_a
    }

    /// Get the anchor on `b`.
    #[must_use]
    pub fn anchor_b(&self) -> Vector2<f64> {
        self.anchor_b
    }

    /// Get the minimum distance.
    #[must_use]
    pub fn min(&self) -> f64 {
        self.limits.min()
    }

    /// Get the maximum distance.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.limits.max()
    }

    /// Get the distance limits.
    #[must_use]
    pub fn limits(&self) -> &JointLimits {
        &self.limits
    }

    /// Set the anchor on `a`.
    pub fn set_anchor_a(&mut self, anchor: Vector2<f64>) {
        self.anchor_a = anchor;
    }

    /// Set the anchor on `b`.
    pub fn set_anchor_b(&mut self, anchor: Vector2<f64>) {
        self.anchor_b = anchor;
    }

    /// Set the minimum distance.
    pub fn set_min(&mut self, min: f64) {
        self.limits.set_min(min);
    }

    /// Set the maximum distance.
    pub fn set_max(&mut self, max: f64) {
        self.limits.set_max(max);
    }
}

impl Constraint for SlideJoint {
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
        self.r1 = a.rotate(&self.anchor_a);
        self.r2 = b.rotate(&self.anchor_b);

        let delta = (b.position + self.r2) - (a.position + self.r1);
        let dist = delta.norm();

        let pdist = match self.limits.state(dist) {
            LimitState::AboveMax(excess) => {
                self.n = normalize_or_zero(&delta);
                excess
            }
            LimitState::BelowMin(deficit) => {
                self.n = -normalize_or_zero(&delta);
                deficit
            }
            LimitState::Free => {
                self.n = Vector2::zeros();
                self.jn_acc = 0.0;
                0.0
            }
        };

        self.n_mass = effective_mass(a, b, &self.r1, &self.r2, &self.n);
        self.bias = self.params.bias_velocity(pdist, dt);
        self.jn_max = self.params.max_impulse(dt);
    }

    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        self.jn_acc *= dt_coef;
        let j = self.n * self.jn_acc;
        apply_impulses(a, b, &self.r1, &self.r2, &j);
    }

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        if self.n == Vector2::zeros() {
            return;
        }

        let vrn = normal_relative_velocity(a, b, &self.r1, &self.r2, &self.n);

        let jn = (self.bias - vrn) * self.n_mass;
        let jn_old = self.jn_acc;
        // Push-only along n: the joint never holds the anchors together.
        self.jn_acc = (jn_old + jn).clamp(-self.jn_max, 0.0);
        let jn = self.jn_acc - jn_old;

        apply_impulses(a, b, &self.r1, &self.r2, &(self.n * jn));
    }

    fn impulse(&self) -> f64 {
        self.jn_acc.abs()
    }
}
