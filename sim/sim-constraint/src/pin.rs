//! Fixed-distance joint between two anchor points.

use nalgebra::Vector2;
use sim_types::math::inverse_length;
use sim_types::{Body, BodyId, BodySet, Result};
use tracing::warn;

use crate::constraint::{
    apply_impulses, effective_mass, normal_relative_velocity, Constraint, ConstraintParams,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Keeps two anchor points a fixed distance apart, like a massless rod.
///
/// The rest distance is measured from the bodies' poses when the joint is
/// created.
///
/// # Example
///
/// ```
/// use sim_constraint::{Constraint, PinJoint};
/// use sim_types::{Body, BodySet, Point2, Vector2};
///
/// let mut bodies = BodySet::new();
/// let a = bodies.insert(Body::new(1.0, 1.0));
/// let b = bodies.insert(Body::new_static().with_position(Point2::new(10.0, 0.0)));
///
/// let joint = PinJoint::new(&bodies, a, b, Vector2::zeros(), Vector2::zeros()).unwrap();
/// assert_eq!(joint.distance(), 10.0);
/// assert_eq!(joint.bodies(), (a, b));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PinJoint {
    body_a: BodyId,
    body_b: BodyId,
    params: ConstraintParams,

    /// Anchor on `a`, relative to its center of gravity.
    anchor_a: Vector2<f64>,
    /// Anchor on `b`, relative to its center of gravity.
    anchor_b: Vector2<f64>,
    /// Rest distance between the anchors.
    distance: f64,

    r1: Vector2<f64>,
    r2: Vector2<f64>,
    n: Vector2<f64>,
    n_mass: f64,
    bias: f64,
    jn_max: f64,

    jn_acc: f64,
}

impl PinJoint {
    /// Pin `anchor_a` on body `a` to `anchor_b` on body `b` at their current
    /// separation.
    ///
    /// Coincident anchors are accepted, but a [`crate::PivotJoint`] is the
    /// more stable choice and a warning is logged.
    pub fn new(
        bodies: &BodySet,
        a: BodyId,
        b: BodyId,
        anchor_a: Vector2<f64>,
        anchor_b: Vector2<f64>,
    ) -> Result<Self> {
        let (body_a, body_b) = bodies.pair(a, b)?;
        let p1 = body_a.position + body_a.rotate(&anchor_a);
        let p2 = body_b.position + body_b.rotate(&anchor_b);
        let distance = (p2 - p1).norm();

        if distance <= 0.0 {
            warn!(
                body_a = %a,
                body_b = %b,
                "0 length pin joint, a pivot joint would be more stable"
            );
        }

        Ok(Self {
            body_a: a,
            body_b: b,
            params: ConstraintParams::default(),
            anchor_a,
            anchor_b,
            distance,
            r1: Vector2::zeros(),
            r2: Vector2::zeros(),
            n: Vector2::zeros(),
            n_mass: 0.0,
            bias: 0.0,
            jn_max: 0.0,
            jn_acc: 0.0,
        })
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

    /// Get the rest distance.
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Set the anchor on `a`.
    pub fn set_anchor_a(&mut self, anchor: Vector2<f64>) {
        self.anchor_a = anchor;
    }

    /// Set the anchor on `b`.
    pub fn set_anchor_b(&mut self, anchor: Vector2<f64>) {
        self.anchor_b = anchor;
    }

    /// Set the rest distance.
    pub fn set_distance(&mut self, distance: f64) {
        self.distance = distance;
    }
}

impl Constraint for PinJoint {
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
        self.n = delta * inverse_length(dist);

        self.n_mass = effective_mass(a, b, &self.r1, &self.r2, &self.n);
        self.bias = self.params.bias_velocity(dist - self.distance, dt);
        self.jn_max = self.params.max_impulse(dt);
    }

    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        self.jn_acc *= dt_coef;
        let j = self.n * self.jn_acc;
        apply_impulses(a, b, &self.r1, &self.r2, &j);
    }

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        let vrn = normal_relative_velocity(a, b, &self.r1, &self.r2, &self.n);

        let jn = (self.bias - vrn) * self.n_mass;
        let jn_old = self.jn_acc;
        self.jn_acc = (jn_old + jn).clamp(-self.jn_max, self.jn_max);
        let jn = self.jn_acc - jn_old;

        apply_impulses(a, b, &self.r1, &self.r2, &(self.n * jn));
    }

    fn impulse(&self) -> f64 {
        self.jn_acc.abs()
    }
}
