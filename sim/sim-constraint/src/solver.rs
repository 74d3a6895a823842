//! Step sequencing for a set of joints.
//!
//! The solver owns its joints in insertion order and runs them through the
//! three solver phases each step. Iteration order never depends on hashing,
//! so identical inputs give bit-identical results.

use sim_types::{BodyId, BodySet, Result, SimError};
use tracing::debug;

use crate::constraint::Constraint;
use crate::joint::Joint;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the constraint solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstraintSolverConfig {
    /// Number of `apply_impulse` passes per step.
    pub iterations: usize,

    /// Whether to re-apply the previous step's impulses before iterating.
    pub warm_starting: bool,
}

impl Default for ConstraintSolverConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            warm_starting: true,
        }
    }
}

impl ConstraintSolverConfig {
    /// Fast configuration for real-time applications.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            iterations: 5,
            warm_starting: true,
        }
    }

    /// Configuration for stiff chains and large mass ratios.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            iterations: 30,
            warm_starting: true,
        }
    }

    /// Set the iteration count.
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Enable or disable warm starting.
    #[must_use]
    pub fn with_warm_starting(mut self, warm_starting: bool) -> Self {
        self.warm_starting = warm_starting;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] if `iterations` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(SimError::invalid_config("iterations must be at least 1"));
        }
        Ok(())
    }
}

/// Handle to a joint owned by a [`ConstraintSolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointId(u64);

impl JointId {
    /// Get the raw ID value.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Joint({})", self.0)
    }
}

/// Summary of one solver step.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverStats {
    /// Number of joints solved.
    pub joints: usize,
    /// Number of `apply_impulse` passes run.
    pub iterations: usize,
    /// Coefficient the cached impulses were scaled by.
    pub dt_coef: f64,
    /// Largest accumulated impulse magnitude after the step.
    pub max_impulse: f64,
}

/// Runs joints through `pre_step`, `apply_cached_impulse` and repeated
/// `apply_impulse` for each step.
///
/// # Example
///
/// ```
/// use sim_constraint::{ConstraintSolver, PinJoint};
/// use sim_types::{Body, BodySet, Point2, Vector2};
///
/// let mut bodies = BodySet::new();
/// let anchor = bodies.insert(Body::new_static());
/// let bob = bodies.insert(Body::new(1.0, 1.0).with_position(Point2::new(0.0, -2.0)));
///
/// let mut solver = ConstraintSolver::default();
/// let pin = PinJoint::new(&bodies, anchor, bob, Vector2::zeros(), Vector2::zeros()).unwrap();
/// solver.add(pin).unwrap();
///
/// bodies.get_mut(bob).unwrap().linear_velocity = Vector2::new(0.0, -1.0);
/// let stats = solver.step(&mut bodies, 1.0 / 60.0).unwrap();
///
/// assert_eq!(stats.joints, 1);
/// assert!(bodies.get(bob).unwrap().linear_velocity.y.abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConstraintSolver {
    config: ConstraintSolverConfig,
    /// Sorted by id, which is also insertion order.
    joints: Vec<(JointId, Joint)>,
    next_id: u64,
    /// Length of the previous step, if any.
    prev_dt: Option<f64>,
}

impl ConstraintSolver {
    /// Create a solver with the given configuration.
    #[must_use]
    pub fn new(config: ConstraintSolverConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &ConstraintSolverConfig {
        &self.config
    }

    /// Replace the configuration.
    pub fn set_config(&mut self, config: ConstraintSolverConfig) {
        self.config = config;
    }

    /// Add a joint, returning its handle.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::SameBody`] if both sides name the same body.
    pub fn add(&mut self, joint: impl Into<Joint>) -> Result<JointId> {
        let joint = joint.into();
        let (a, b) = joint.bodies();
        if a == b {
            return Err(SimError::SameBody(a.raw()));
        }

        let id = JointId(self.next_id);
        self.next_id += 1;
        self.joints.push((id, joint));
        Ok(id)
    }

    /// Remove a joint, returning it.
    ///
    /// The bodies it connected are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidJointId`] if `id` is not in the solver.
    pub fn remove(&mut self, id: JointId) -> Result<Joint> {
        let index = self.index_of(id)?;
        Ok(self.joints.remove(index).1)
    }

    /// Get a joint.
    #[must_use]
    pub fn get(&self, id: JointId) -> Option<&Joint> {
        self.index_of(id).ok().map(|i| &self.joints[i].1)
    }

    /// Get a joint mutably.
    pub fn get_mut(&mut self, id: JointId) -> Option<&mut Joint> {
        let index = self.index_of(id).ok()?;
        Some(&mut self.joints[index].1)
    }

    /// Check if a joint is present.
    #[must_use]
    pub fn contains(&self, id: JointId) -> bool {
        self.index_of(id).is_ok()
    }

    /// Iterate joints in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (JointId, &Joint)> {
        self.joints.iter().map(|(id, joint)| (*id, joint))
    }

    /// Iterate joints attached to `body`.
    pub fn joints_for_body(&self, body: BodyId) -> impl Iterator<Item = (JointId, &Joint)> {
        self.iter().filter(move |(_, joint)| {
            let (a, b) = joint.bodies();
            a == body || b == body
        })
    }

    /// Number of joints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// Check if there are no joints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Remove every joint and forget the previous step length.
    pub fn clear(&mut self) {
        self.joints.clear();
        self.prev_dt = None;
    }

    /// Forget the previous step length, so the next step starts cold.
    pub fn reset_warm_start(&mut self) {
        self.prev_dt = None;
    }

    /// Advance all joints by one step of length `dt`.
    ///
    /// Every joint's bodies are looked up before any velocity changes, so an
    /// unknown body leaves the body set untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidTimestep`] if `dt` is not positive and
    /// finite, [`SimError::InvalidConfig`] if the configuration is invalid,
    /// or [`SimError::InvalidBodyId`] if a joint names a body missing from
    /// `bodies`.
    pub fn step(&mut self, bodies: &mut BodySet, dt: f64) -> Result<SolverStats> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(SimError::InvalidTimestep(dt));
        }
        self.config.validate()?;

        for (_, joint) in &mut self.joints {
            let (a, b) = joint.bodies();
            let (body_a, body_b) = bodies.pair(a, b)?;
            joint.pre_step(body_a, body_b, dt);
        }

        // Zero on a cold start: springs still apply their step impulse.
        let dt_coef = match self.prev_dt {
            Some(prev_dt) if self.config.warm_starting => dt / prev_dt,
            _ => 0.0,
        };
        for (_, joint) in &mut self.joints {
            let (a, b) = joint.bodies();
            let (body_a, body_b) = bodies.pair_mut(a, b)?;
            joint.apply_cached_impulse(body_a, body_b, dt_coef);
        }

        for _ in 0..self.config.iterations {
            for (_, joint) in &mut self.joints {
                let (a, b) = joint.bodies();
                let (body_a, body_b) = bodies.pair_mut(a, b)?;
                joint.apply_impulse(body_a, body_b);
            }
        }

        self.prev_dt = Some(dt);

        let stats = SolverStats {
            joints: self.joints.len(),
            iterations: self.config.iterations,
            dt_coef,
            max_impulse: self
                .joints
                .iter()
                .map(|(_, joint)| joint.impulse())
                .fold(0.0, f64::max),
        };
        debug!(
            joints = stats.joints,
            iterations = stats.iterations,
            dt_coef = stats.dt_coef,
            max_impulse = stats.max_impulse,
            "constraint solver step"
        );

        Ok(stats)
    }

    fn index_of(&self, id: JointId) -> Result<usize> {
        self.joints
            .binary_search_by_key(&id, |(id, _)| *id)
            .map_err(|_| SimError::InvalidJointId(id.0))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::{DampedSpring, PivotJoint, SimpleMotor};
    use approx::assert_relative_eq;
    use nalgebra::{Point2, Vector2};
    use sim_types::Body;

    const DT: f64 = 1.0 / 60.0;

    #[test]
    fn test_config_presets() {
        assert!(ConstraintSolverConfig::default().validate().is_ok());
        assert!(ConstraintSolverConfig::realtime().iterations < 10);
        assert!(ConstraintSolverConfig::high_accuracy().iterations > 10);
        assert!(ConstraintSolverConfig::default()
            .with_iterations(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_add_remove_preserves_order() {
        let mut solver = ConstraintSolver::default();
        let a = BodyId::new(0);
        let b = BodyId::new(1);

        let first = solver.add(SimpleMotor::new(a, b, 1.0)).unwrap();
        let second = solver.add(SimpleMotor::new(a, b, 2.0)).unwrap();
        let third = solver.add(SimpleMotor::new(a, b, 3.0)).unwrap();

        solver.remove(second).unwrap();
        let ids: Vec<_> = solver.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![first, third]);
        assert!(!solver.contains(second));
        assert!(solver.remove(second).is_err());
        assert_eq!(first.to_string(), "Joint(0)");
    }

    #[test]
    fn test_same_body_rejected() {
        let mut solver = ConstraintSolver::default();
        let a = BodyId::new(0);
        assert_eq!(
            solver.add(SimpleMotor::new(a, a, 1.0)),
            Err(SimError::SameBody(0))
        );
    }

    #[test]
    fn test_invalid_timestep() {
        let mut solver = ConstraintSolver::default();
        let mut bodies = BodySet::new();
        assert!(solver.step(&mut bodies, 0.0).is_err());
        assert!(solver.step(&mut bodies, f64::NAN).is_err());
        assert!(solver.step(&mut bodies, -DT).is_err());
    }

    #[test]
    fn test_unknown_body_leaves_velocities_untouched() {
        let mut bodies = BodySet::new();
        let a = bodies.insert(Body::new(1.0, 1.0).with_velocity(Vector2::new(1.0, 0.0), 0.0));
        let b = bodies.insert(Body::new_static());

        let mut solver = ConstraintSolver::default();
        solver.add(SimpleMotor::new(a, b, 5.0)).unwrap();
        solver.add(SimpleMotor::new(a, BodyId::new(9), 5.0)).unwrap();

        assert!(solver.step(&mut bodies, DT).is_err());
        assert_eq!(bodies.get(a).unwrap().angular_velocity, 0.0);
    }

    #[test]
    fn test_cold_then_warm_dt_coef() {
        let mut bodies = BodySet::new();
        let a = bodies.insert(Body::new(1.0, 1.0));
        let b = bodies.insert(Body::new_static());
        let mut solver = ConstraintSolver::default();
        solver.add(SimpleMotor::new(a, b, 1.0)).unwrap();

        assert_eq!(solver.step(&mut bodies, DT).unwrap().dt_coef, 0.0);
        let stats = solver.step(&mut bodies, DT / 2.0).unwrap();
        assert_relative_eq!(stats.dt_coef, 0.5);

        solver.reset_warm_start();
        assert_eq!(solver.step(&mut bodies, DT).unwrap().dt_coef, 0.0);
    }

    #[test]
    fn test_warm_starting_disabled() {
        let mut bodies = BodySet::new();
        let a = bodies.insert(Body::new(1.0, 1.0));
        let b = bodies.insert(Body::new_static());
        let mut solver =
            ConstraintSolver::new(ConstraintSolverConfig::default().with_warm_starting(false));
        solver.add(SimpleMotor::new(a, b, 1.0)).unwrap();

        solver.step(&mut bodies, DT).unwrap();
        assert_eq!(solver.step(&mut bodies, DT).unwrap().dt_coef, 0.0);
    }

    #[test]
    fn test_spring_applies_on_cold_start() {
        let mut bodies = BodySet::new();
        let a = bodies.insert(Body::new_static());
        let b = bodies.insert(Body::new(1.0, 1.0).with_position(Point2::new(2.0, 0.0)));
        let mut solver = ConstraintSolver::default();
        solver
            .add(DampedSpring::new(
                a,
                b,
                Vector2::zeros(),
                Vector2::zeros(),
                1.0,
                10.0,
                0.0,
            ))
            .unwrap();

        solver.step(&mut bodies, DT).unwrap();

        assert_relative_eq!(
            bodies.get(b).unwrap().linear_velocity.x,
            -10.0 * DT,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_deterministic_replay() {
        fn run() -> Vec<Body> {
            let mut bodies = BodySet::new();
            let ground = bodies.insert(Body::new_static());
            let mut prev = ground;
            let mut solver = ConstraintSolver::default();
            for i in 1..=5 {
                let body = bodies.insert(
                    Body::new(1.0, 0.1)
                        .with_position(Point2::new(f64::from(i), 0.0))
                        .with_velocity(Vector2::new(0.0, -f64::from(i)), 0.0),
                );
                solver
                    .add(PivotJoint::from_world_pivot(&bodies, prev, body, Point2::new(f64::from(i) - 0.5, 0.0)).unwrap())
                    .unwrap();
                prev = body;
            }
            for _ in 0..3 {
                solver.step(&mut bodies, DT).unwrap();
            }
            bodies.iter().map(|(_, body)| *body).collect()
        }

        assert_eq!(run(), run());
    }
}
