//! Core types for planar rigid-body simulation.
//!
//! This crate provides the foundational data the solver and broad phase
//! share:
//!
//! - [`Body`] - Position, angle, velocities and inverse mass properties
//! - [`BodyId`] / [`BodySet`] - Stable identifiers and insertion-ordered storage
//! - [`MassProperties`] - Moments of inertia for common planar shapes
//! - [`math`] - 2D cross products, perpendiculars and clamping helpers
//! - [`SimError`] - Errors for invalid IDs, timesteps and configuration
//!
//! # Design Philosophy
//!
//! These types are **plain data**. Integration of positions, collision
//! response and scheduling belong to whatever drives the simulation. The
//! constraint solver reads a body's pose and mass properties and only ever
//! adds impulses to its velocities.
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: up
//! - Angles are counter-clockwise positive, in radians
//!
//! # Example
//!
//! ```
//! use sim_types::{Body, BodySet, MassProperties};
//! use nalgebra::Point2;
//!
//! let mut bodies = BodySet::new();
//! let ground = bodies.insert(Body::new_static());
//! let props = MassProperties::circle(1.0, 0.0, 0.5, nalgebra::Vector2::zeros());
//! let ball = bodies.insert(
//!     Body::from_mass_properties(&props).with_position(Point2::new(0.0, 2.0)),
//! );
//!
//! let (g, b) = bodies.pair(ground, ball).unwrap();
//! assert!(g.is_static());
//! assert_eq!(b.position.y, 2.0);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod error;
pub mod math;

pub use body::{Body, BodyId, BodySet, MassProperties};
pub use error::SimError;

// Re-export math types for convenience
pub use nalgebra::{Point2, UnitComplex, Vector2};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_body_set_round_trip() {
        let mut bodies = BodySet::new();
        let a = bodies.insert(Body::new(1.0, 1.0).with_position(Point2::new(1.0, 2.0)));
        let b = bodies.insert(Body::new_static());

        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies.get(a).unwrap().position, Point2::new(1.0, 2.0));
        assert!(bodies.get(b).unwrap().is_static());

        let ids: Vec<_> = bodies.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_body_id_display() {
        assert_eq!(BodyId::new(7).to_string(), "Body(7)");
    }
}
