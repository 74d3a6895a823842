//! Point-to-point joint: two anchors that must coincide.

use nalgebra::{Matrix2, Point2, Vector2};
use sim_types::math::clamp_length;
use sim_types::{Body, BodyId, BodySet, Result};

use crate::constraint::{
    apply_impulses, effective_mass_tensor, relative_velocity, Constraint, ConstraintParams,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Holds an anchor on each body at the same world point, leaving the bodies
/// free to rotate around it.
///
/// # Example
///
/// ```
/// use sim_constraint::PivotJoint;
/// use sim_types::{Body, BodySet, Point2};
///
/// let mut bodies = BodySet::new();
/// let a = bodies.insert(Body::new_static());
/// let b = bodies.insert(Body::new(1.0, 1.0).with_position(Point2::new(2.0, 0.0)));
///
/// let joint = PivotJoint::from_world_pivot(&bodies, a, b, Point2::new(1.0, 0.0)).unwrap();
/// assert_eq!(joint.anchor_a().x, 1.0);
/// assert_eq!(joint.anchor_b().x, -1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PivotJoint {
    body_a: BodyId,
    body_b: BodyId,
    params: ConstraintParams,

    anchor_a: Vector2<f64>,
    anchor_b: Vector2<f64>,

    r1: Vector2<f64>,
    r2: Vector2<f64>,
    /// Inverse of the point mass matrix.
    k: Matrix2<f64>,
    bias: Vector2<f64>,
    j_max: f64,

    j_acc: Vector2<f64>,
}

impl PivotJoint {
    /// Create a pivot from body-local anchors.
    #[must_use]
    pub fn new(a: BodyId, b: BodyId, anchor_a: Vector2<f64>, anchor_b: Vector2<f64>) -> Self {
        Self {
            body_a: a,
            body_b: b,
            params: ConstraintParams::default(),
            anchor_a,
            anchor_b,
            r1: Vector2::zeros(),
            r2: Vector2::zeros(),
            k: Matrix2::zeros(),
            bias: Vector2::zeros(),
            j_max: 0.0,
            j_acc: Vector2::zeros(),
        }
    }

    /// Create a pivot at a world-space point, converting it into each body's
    /// local frame.
    pub fn from_world_pivot(
        bodies: &BodySet,
        a: BodyId,
        b: BodyId,
        pivot: Point2<f64>,
    ) -> Result<Self> {
        let (body_a, body_b) = bodies.pair(a, b)?;
        let anchor_a = body_a.world_to_local(&pivot).coords;
        let anchor_b = body_b.world_to_local(&pivot).coords;
        Ok(Self::new(a, b, anchor_a, anchor_b))
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

    /// Set the anchor on `a`.
    pub fn set_anchor_a(&mut self, anchor: Vector2<f64>) {
        self.anchor_a = anchor;
    }

    /// Set the anchor on `b`.
    pub fn set_anchor_b(&mut self, anchor: Vector2<f64>) {
        self.anchor_b = anchor;
    }

    /// Accumulated impulse vector from the most recent step.
    #[must_use]
    pub fn impulse_vector(&self) -> Vector2<f64> {
        self.j_acc
    }
}

impl Constraint for PivotJoint {
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
        self.j_acc = clamp_length(&(j_old + j), self.j_max);
        let j = self.j_acc - j_old;

        apply_impulses(a, b, &self.r1, &self.r2, &j);
    }

    fn impulse(&self) -> f64 {
        self.j_acc.norm()
    }
}
