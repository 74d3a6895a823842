//! Damped linear and rotary springs.
//!
//! Springs are soft: their force follows from the current stretch, so they
//! have no bias velocity and no impulse clamp. The spring impulse for a step
//! is computed in `pre_step` and applied once in `apply_cached_impulse`;
//! `apply_impulse` only adds damping, which is solved implicitly so that
//! stiff damping does not blow up.

use nalgebra::Vector2;
use sim_types::math::inverse_length;
use sim_types::{Body, BodyId};

use crate::constraint::{
    apply_angular_impulses, apply_impulses, inverse_or_zero, k_scalar,
    normal_relative_velocity, Constraint, ConstraintParams,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Spring force as a function of the current anchor distance.
pub type SpringForceFn = fn(&DampedSpring, f64) -> f64;

/// Spring torque as a function of the current relative angle
/// `a.angle - b.angle`.
pub type SpringTorqueFn = fn(&DampedRotarySpring, f64) -> f64;

/// Hooke's law: `(rest_length - dist) * stiffness`.
#[must_use]
pub fn default_spring_force(spring: &DampedSpring, dist: f64) -> f64 {
    (spring.rest_length - dist) * spring.stiffness
}

/// Hooke's law for angles: `(relative_angle - rest_angle) * stiffness`.
#[must_use]
pub fn default_spring_torque(spring: &DampedRotarySpring, relative_angle: f64) -> f64 {
    (relative_angle - spring.rest_angle) * spring.stiffness
}

// ============================================================================
// DampedSpring
// ============================================================================

/// A damped spring between two anchor points.
///
/// # Example
///
/// ```
/// use sim_constraint::{Constraint, DampedSpring};
/// use sim_types::{Body, BodyId, Point2, Vector2};
///
/// let mut a = Body::new_static();
/// let mut b = Body::new(1.0, 1.0).with_position(Point2::new(2.0, 0.0));
/// let mut spring = DampedSpring::new(
///     BodyId::new(0),
///     BodyId::new(1),
///     Vector2::zeros(),
///     Vector2::zeros(),
///     1.0,
///     10.0,
///     0.5,
/// );
///
/// spring.pre_step(&a, &b, 0.1);
/// spring.apply_cached_impulse(&mut a, &mut b, 0.0);
///
/// // Stretched by 1.0: pulled back toward `a`.
/// assert!(b.linear_velocity.x < 0.0);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DampedSpring {
    body_a: BodyId,
    body_b: BodyId,
    params: ConstraintParams,

    anchor_a: Vector2<f64>,
    anchor_b: Vector2<f64>,
    rest_length: f64,
    stiffness: f64,
    damping: f64,
    /// Replacement for [`default_spring_force`].
    #[cfg_attr(feature = "serde", serde(skip))]
    force_fn: Option<SpringForceFn>,

    r1: Vector2<f64>,
    r2: Vector2<f64>,
    n: Vector2<f64>,
    n_mass: f64,
    target_vrn: f64,
    v_coef: f64,
    /// Spring impulse for the current step, applied once.
    j_spring: f64,

    j_acc: f64,
}

impl DampedSpring {
    /// Create a damped spring.
    #[must_use]
    pub fn new(
        a: BodyId,
        b: BodyId,
        anchor_a: Vector2<f64>,
        anchor_b: Vector2<f64>,
        rest_length: f64,
        stiffness: f64,
        damping: f64,
    ) -> Self {
        Self {
            body_a: a,
            body_b: b,
            params: ConstraintParams::default(),
            anchor_a,
            anchor_b,
            rest_length,
            stiffness,
            damping,
            force_fn: None,
            r1: Vector2::zeros(),
            r2: Vector2::zeros(),
            n: Vector2::zeros(),
            n_mass: 0.0,
            target_vrn: 0.0,
            v_coef: 0.0,
            j_spring: 0.0,
            j_acc: 0.0,
        }
    }

    /// Replace the force law.
    #[must_use]
    pub fn with_force_fn(mut self, force_fn: SpringForceFn) -> Self {
        self.force_fn = Some(force_fn);
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

    /// Get the rest length.
    #[must_use]
    pub fn rest_length(&self) -> f64 {
        self.rest_length
    }

    /// Get the stiffness.
    #[must_use]
    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    /// Get the damping.
    #[must_use]
    pub fn damping(&self) -> f64 {
        self.damping
    }

    /// Set the anchor on `a`.
    pub fn set_anchor_a(&mut self, anchor: Vector2<f64>) {
        self.anchor_a = anchor;
    }

    /// Set the anchor on `b`.
    pub fn set_anchor_b(&mut self, anchor: Vector2<f64>) {
        self.anchor_b = anchor;
    }

    /// Set the rest length.
    pub fn set_rest_length(&mut self, rest_length: f64) {
        self.rest_length = rest_length;
    }

    /// Set the stiffness.
    pub fn set_stiffness(&mut self, stiffness: f64) {
        self.stiffness = stiffness;
    }

    /// Set the damping.
    pub fn set_damping(&mut self, damping: f64) {
        self.damping = damping;
    }

    /// Set or clear the force law.
    pub fn set_force_fn(&mut self, force_fn: Option<SpringForceFn>) {
        self.force_fn = force_fn;
    }

    fn force(&self, dist: f64) -> f64 {
        self.force_fn.unwrap_or(default_spring_force)(self, dist)
    }
}

impl Constraint for DampedSpring {
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

        let k = k_scalar(a, b, &self.r1, &self.r2, &self.n);
        self.n_mass = inverse_or_zero(k);

        self.target_vrn = 0.0;
        self.v_coef = 1.0 - (-self.damping * dt * k).exp();

        self.j_spring = self.force(dist) * dt;
        self.j_acc = self.j_spring;
    }

    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, _dt_coef: f64) {
        let j = self.n * self.j_spring;
        apply_impulses(a, b, &self.r1, &self.r2, &j);
    }

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        let vrn = normal_relative_velocity(a, b, &self.r1, &self.r2, &self.n);

        let v_damp = (self.target_vrn - vrn) * self.v_coef;
        self.target_vrn = vrn + v_damp;

        let j_damp = v_damp * self.n_mass;
        self.j_acc += j_damp;
        apply_impulses(a, b, &self.r1, &self.r2, &(self.n * j_damp));
    }

    fn impulse(&self) -> f64 {
        self.j_acc.abs()
    }
}

// ============================================================================
// DampedRotarySpring
// ============================================================================

/// A damped torsion spring on the relative angle of two bodies.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DampedRotarySpring {
    body_a: BodyId,
    body_b: BodyId,
    params: ConstraintParams,

    rest_angle: f64,
    stiffness: f64,
    damping: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    torque_fn: Option<SpringTorqueFn>,

    i_sum: f64,
    target_wrn: f64,
    w_coef: f64,
    j_spring: f64,

    j_acc: f64,
}

impl DampedRotarySpring {
    /// Create a damped rotary spring.
    #[must_use]
    pub fn new(a: BodyId, b: BodyId, rest_angle: f64, stiffness: f64, damping: f64) -> Self {
        Self {
            body_a: a,
            body_b: b,
            params: ConstraintParams::default(),
            rest_angle,
            stiffness,
            damping,
            torque_fn: None,
            i_sum: 0.0,
            target_wrn: 0.0,
            w_coef: 0.0,
            j_spring: 0.0,
            j_acc: 0.0,
        }
    }

    /// Replace the torque law.
    #[must_use]
    pub fn with_torque_fn(mut self, torque_fn: SpringTorqueFn) -> Self {
        self.torque_fn = Some(torque_fn);
        self
    }

    /// Get the rest angle.
    #[must_use]
    pub fn rest_angle(&self) -> f64 {
        self.rest_angle
    }

    /// Get the stiffness.
    #[must_use]
    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    /// Get the damping.
    #[must_use]
    pub fn damping(&self) -> f64 {
        self.damping
    }

    /// Set the rest angle.
    pub fn set_rest_angle(&mut self, rest_angle: f64) {
        self.rest_angle = rest_angle;
    }

    /// Set the stiffness.
    pub fn set_stiffness(&mut self, stiffness: f64) {
        self.stiffness = stiffness;
    }

    /// Set the damping.
    pub fn set_damping(&mut self, damping: f64) {
        self.damping = damping;
    }

    /// Set or clear the torque law.
    pub fn set_torque_fn(&mut self, torque_fn: Option<SpringTorqueFn>) {
        self.torque_fn = torque_fn;
    }

    fn torque(&self, relative_angle: f64) -> f64 {
        self.torque_fn.unwrap_or(default_spring_torque)(self, relative_angle)
    }
}

impl Constraint for DampedRotarySpring {
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
        let moment = a.inv_moment() + b.inv_moment();
        self.i_sum = inverse_or_zero(moment);

        self.w_coef = 1.0 - (-self.damping * dt * moment).exp();
        self.target_wrn = 0.0;

        self.j_spring = self.torque(a.angle() - b.angle()) * dt;
        self.j_acc = self.j_spring;
    }

    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, _dt_coef: f64) {
        apply_angular_impulses(a, b, self.j_spring);
    }

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        let wrn = a.angular_velocity - b.angular_velocity;

        let w_damp = (self.target_wrn - wrn) * self.w_coef;
        self.target_wrn = wrn + w_damp;

        let j_damp = w_damp * self.i_sum;
        self.j_acc += j_damp;
        apply_angular_impulses(a, b, -j_damp);
    }

    fn impulse(&self) -> f64 {
        self.j_acc.abs()
    }
}
