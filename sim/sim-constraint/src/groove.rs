//! Pivot that slides along a line segment fixed to the first body.

use nalgebra::{Matrix2, Point2, Vector2};
use sim_types::math::{clamp_length, cross, normalize_or_zero, perp, project};
use sim_types::{Body, BodyId};

use crate::constraint::{
    apply_impulses, effective_mass_tensor, relative_velocity, Constraint, ConstraintParams,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pins an anchor on `b` to a groove segment on `a`.
///
/// The anchor may slide freely between the groove ends. Past an end the
/// joint behaves like a pivot at that end, except that it only resists
/// motion further out of the groove.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GrooveJoint {
    body_a: BodyId,
    body_b: BodyId,
    params: ConstraintParams,

    /// Groove start, local to `a`.
    groove_a: Point2<f64>,
    /// Groove end, local to `a`.
    groove_b: Point2<f64>,
    /// Groove normal, local to `a`.
    groove_n: Vector2<f64>,
    anchor_b: Vector2<f64>,

    /// Groove normal in world orientation.
    groove_tn: Vector2<f64>,
    /// `1` past the start, `-1` past the end, `0` in between.
    clamp: f64,
    r1: Vector2<f64>,
    r2: Vector2<f64>,
    k: Matrix2<f64>,
    bias: Vector2<f64>,
    j_max: f64,

    j_acc: Vector2<f64>,
}

impl GrooveJoint {
    /// Create a groove from `groove_a` to `groove_b` on body `a` holding
    /// `anchor_b` on body `b`.
    #[must_use]
    pub fn new(
        a: BodyId,
        b: BodyId,
        groove_a: Point2<f64>,
        groove_b: Point2<f64>,
        anchor_b: Vector2<f64>,
    ) -> Self {
        Self {
            body_a: a,
            body_b: b,
            params: ConstraintParams::default(),
            groove_a,
            groove_b,
            groove_n: groove_normal(&groove_a, &groove_b),
            anchor_b,
            groove_tn: Vector2::zeros(),
            clamp: 0.0,
            r1: Vector2::zeros(),
            r2: Vector2::zeros(),
            k: Matrix2::zeros(),
            bias: Vector2::zeros(),
            j_max: 0.0,
            j_acc: Vector2::zeros(),
        }
    }

    /// Replace the constraint parameters.
    #[must_use]
    pub fn with_params(mut self, params: ConstraintParams) -> Self {
        self.params = params;
        self
    }

    /// Get the groove start.
    #[must_use]
    pub fn groove_a(&self) -> Point2<f64> {
        self.groove_a
    }

    /// Get the groove end.
    #[must_use]
    pub fn groove_b(&self) -> Point2<f64> {
        self.groove_b
    }

    /// Get the anchor on `b`.
    #[must_use]
    pub fn anchor_b(&self) -> Vector2<f64> {
        self.anchor_b
    }

    /// Set the groove start and recompute the groove normal.
    pub fn set_groove_a(&mut self, groove_a: Point2<f64>) {
        self.groove_a = groove_a;
        self.groove_n = groove_normal(&self.groove_a, &self.groove_b);
    }

    /// Set the groove end and recompute the groove normal.
    pub fn set_groove_b(&mut self, groove_b: Point2<f64>) {
        self.groove_b = groove_b;
        self.groove_n = groove_normal(&self.groove_a, &self.groove_b);
    }

    /// Set the anchor on `b`.
    pub fn set_anchor_b(&mut self, anchor: Vector2<f64>) {
        self.anchor_b = anchor;
    }

    /// Restrict an impulse to what the groove can push with.
    fn constrain(&self, j: &Vector2<f64>) -> Vector2<f64> {
        let n = &self.groove_tn;
        let j_clamp = if self.clamp * cross(j, n) > 0.0 {
            *j
        } else {
            project(j, n)
        };
        clamp_length(&j_clamp, self.j_max)
    }
}

fn groove_normal(a: &Point2<f64>, b: &Point2<f64>) -> Vector2<f64> {
    perp(&normalize_or_zero(&(b - a)))
}

impl Constraint for GrooveJoint {
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
        let ta = a.local_to_world(&self.groove_a).coords;
        let tb = a.local_to_world(&self.groove_b).coords;

        let n = a.rotate(&self.groove_n);
        let d = ta.dot(&n);

        self.groove_tn = n;
        self.r2 = b.rotate(&self.anchor_b);

        // Position of the anchor along the groove tangent.
        let td = cross(&(b.position.coords + self.r2), &n);
        if td <= cross(&ta, &n) {
            self.clamp = 1.0;
            self.r1 = ta - a.position.coords;
        } else if td >= cross(&tb, &n) {
            self.clamp = -1.0;
            self.r1 = tb - a.position.coords;
        } else {
            self.clamp = 0.0;
            self.r1 = perp(&n) * -td + n * d - a.position.coords;
        }

        self.k = effective_mass_tensor(a, b, &self.r1, &self.r2);
        self.j_max = self.params.max_impulse(dt);

        let delta = (b.position + self.r2) - (a.position + self.r1);
        self.bias = self.params.bias_velocity_vector(&delta, dt);
    }

    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        self.j_acc *= dt_coef;
        apply_impulses(a, b, &self.r1, &self.r2, &self.j_acc);
    }

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        let vr = relative_velocity(a, b, &self.r1, &self.r2);

        let j = self.k * (self.bias - vr);
        let j_old = self.j_acc;
        self.j_acc = self.constrain(&(j_old + j));
        let j = self.j_acc - j_old;

        apply_impulses(a, b, &self.r1, &self.r2, &j);
    }

    fn impulse(&self) -> f64 {
        self.j_acc.norm()
    }
}
