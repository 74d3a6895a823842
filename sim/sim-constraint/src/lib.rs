//! Joints, springs and motors for planar rigid bodies.
//!
//! Constraints are solved with warm-started sequential impulses. Each step,
//! every constraint goes through three phases:
//!
//! ```text
//! pre_step(dt)              effective mass, bias, impulse clamp
//! apply_cached_impulse(k)   last step's impulse * dt / prev_dt
//! apply_impulse()  x N      one sequential-impulse pass
//! ```
//!
//! [`ConstraintSolver`] runs that sequence over a set of joints in insertion
//! order. The individual joint types can also be driven directly through the
//! [`Constraint`] trait.
//!
//! # Joint Types
//!
//! | Type | Constrains | Impulse |
//! |---|---|---|
//! | [`PinJoint`] | anchor distance = rest distance | scalar |
//! | [`SlideJoint`] | anchor distance in `[min, max]` | scalar, push-only |
//! | [`PivotJoint`] | anchors coincide | 2-vector, disc-clamped |
//! | [`GrooveJoint`] | anchor on a segment | 2-vector, end-stop clamped |
//! | [`GearJoint`] | `b.angle * ratio - a.angle = phase` | angular |
//! | [`SimpleMotor`] | relative spin = rate | angular |
//! | [`RatchetJoint`] | one-way relative angle | angular, one-sided |
//! | [`RotaryLimitJoint`] | relative angle in `[min, max]` | angular, one-sided |
//! | [`DampedSpring`] | soft anchor distance | unclamped |
//! | [`DampedRotarySpring`] | soft relative angle | unclamped |
//!
//! # Parameters
//!
//! Every joint carries [`ConstraintParams`]:
//!
//! - `max_force`: the accumulated impulse is clamped to `max_force * dt`
//! - `max_bias`: cap on the speed used to correct positional error
//! - `error_bias`: fraction of error left after one second; the default
//!   corrects 10% per 1/60 s step
//!
//! # Example
//!
//! ```
//! use sim_constraint::{ConstraintSolver, GearJoint, PivotJoint};
//! use sim_types::{Body, BodySet, Point2, Vector2};
//!
//! let mut bodies = BodySet::new();
//! let frame = bodies.insert(Body::new_static());
//! let wheel_a = bodies.insert(Body::new(1.0, 0.5));
//! let wheel_b = bodies.insert(Body::new(1.0, 2.0).with_position(Point2::new(3.0, 0.0)));
//!
//! let mut solver = ConstraintSolver::default();
//! solver.add(PivotJoint::from_world_pivot(&bodies, frame, wheel_a, Point2::origin()).unwrap()).unwrap();
//! solver.add(PivotJoint::from_world_pivot(&bodies, frame, wheel_b, Point2::new(3.0, 0.0)).unwrap()).unwrap();
//! solver.add(GearJoint::new(wheel_a, wheel_b, 0.0, -2.0)).unwrap();
//!
//! bodies.get_mut(wheel_a).unwrap().angular_velocity = 4.0;
//! solver.step(&mut bodies, 1.0 / 60.0).unwrap();
//!
//! let wa = bodies.get(wheel_a).unwrap().angular_velocity;
//! let wb = bodies.get(wheel_b).unwrap().angular_velocity;
//! assert!((wb * -2.0 - wa).abs() < 1e-6);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-constraint/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,        // Error docs added where non-obvious
    clippy::too_many_arguments,        // Spring constructors mirror their parameters
    clippy::many_single_char_names,    // a, b, r1, r2, n, j follow the impulse equations
    clippy::similar_names,             // r1/r2, j/j_old are intentionally parallel
)]

mod constraint;
mod gear;
mod groove;
mod joint;
mod limits;
mod motor;
mod pin;
mod pivot;
mod ratchet;
mod rotary_limit;
mod slide;
mod solver;
mod spring;

pub use constraint::{default_error_bias, Constraint, ConstraintParams};
pub use gear::GearJoint;
pub use groove::GrooveJoint;
pub use joint::{Joint, JointType};
pub use limits::{JointLimits, LimitState};
pub use motor::SimpleMotor;
pub use pin::PinJoint;
pub use pivot::PivotJoint;
pub use ratchet::RatchetJoint;
pub use rotary_limit::RotaryLimitJoint;
pub use slide::SlideJoint;
pub use solver::{ConstraintSolver, ConstraintSolverConfig, JointId, SolverStats};
pub use spring::{
    default_spring_force, default_spring_torque, DampedRotarySpring, DampedSpring,
    SpringForceFn, SpringTorqueFn,
};

// Re-export body types for convenience
pub use sim_types::{Body, BodyId, BodySet};
