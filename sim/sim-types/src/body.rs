//! Planar rigid body state.
//!
//! A [`Body`] carries the attributes the constraint solver reads (pose and
//! mass properties) and the two it writes (linear and angular velocity).
//! Integration of position and angle is owned by whatever drives the
//! simulation; nothing in this workspace assigns a pose on its own.

use nalgebra::{Point2, UnitComplex, Vector2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::math::cross_scalar;
use crate::{Result, SimError};

/// Unique identifier for a rigid body inside a [`BodySet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub usize);

impl BodyId {
    /// Create a new body ID.
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> usize {
        self.0
    }
}

impl From<usize> for BodyId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({})", self.0)
    }
}

/// A 2D rigid body.
///
/// Static bodies are represented by zero inverse mass and zero inverse
/// moment, so impulses applied to them have no effect.
///
/// # Example
///
/// ```
/// use sim_types::Body;
/// use nalgebra::{Point2, Vector2};
///
/// let mut body = Body::new(2.0, 1.0).with_position(Point2::new(1.0, 0.0));
/// body.apply_impulse(&Vector2::new(4.0, 0.0), &Vector2::zeros());
///
/// assert_eq!(body.linear_velocity.x, 2.0);
/// assert_eq!(body.angular_velocity, 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Body {
    /// Position of the center of gravity in world coordinates.
    pub position: Point2<f64>,
    /// Orientation in radians. Not wrapped, so multi-turn joints can track
    /// accumulated rotation.
    angle: f64,
    /// Cached unit rotation matching `angle`.
    rotation: UnitComplex<f64>,
    /// Linear velocity of the center of gravity.
    pub linear_velocity: Vector2<f64>,
    /// Angular velocity (rad/s, counter-clockwise positive).
    pub angular_velocity: f64,
    /// Inverse mass (0 for static bodies).
    inv_mass: f64,
    /// Inverse moment of inertia (0 for static bodies).
    inv_moment: f64,
}

impl Default for Body {
    fn default() -> Self {
        Self::new_static()
    }
}

impl Body {
    /// Create a body with the given mass and moment of inertia.
    ///
    /// Pass `f64::INFINITY` for either value to make that degree of freedom
    /// immovable.
    #[must_use]
    pub fn new(mass: f64, moment: f64) -> Self {
        Self {
            position: Point2::origin(),
            angle: 0.0,
            rotation: UnitComplex::identity(),
            linear_velocity: Vector2::zeros(),
            angular_velocity: 0.0,
            inv_mass: inverse_or_zero(mass),
            inv_moment: inverse_or_zero(moment),
        }
    }

    /// Create a static (infinite mass, infinite moment) body.
    #[must_use]
    pub fn new_static() -> Self {
        Self::new(f64::INFINITY, f64::INFINITY)
    }

    /// Create a body from precomputed mass properties.
    #[must_use]
    pub fn from_mass_properties(props: &MassProperties) -> Self {
        Self::new(props.mass, props.moment)
    }

    /// Set the position.
    #[must_use]
    pub fn with_position(mut self, position: Point2<f64>) -> Self {
        self.position = position;
        self
    }

    /// Set the angle.
    #[must_use]
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.set_angle(angle);
        self
    }

    /// Set the linear and angular velocity.
    #[must_use]
    pub fn with_velocity(mut self, linear: Vector2<f64>, angular: f64) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    /// Get the angle in radians.
    #[must_use]
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Set the angle in radians, keeping the cached rotation in sync.
    pub fn set_angle(&mut self, angle: f64) {
        self.angle = angle;
        self.rotation = UnitComplex::new(angle);
    }

    /// Get the unit rotation for the current angle.
    #[must_use]
    pub fn rotation(&self) -> &UnitComplex<f64> {
        &self.rotation
    }

    /// Get the inverse mass.
    #[must_use]
    pub fn inv_mass(&self) -> f64 {
        self.inv_mass
    }

    /// Get the inverse moment of inertia.
    #[must_use]
    pub fn inv_moment(&self) -> f64 {
        self.inv_moment
    }

    /// Get the mass (`INFINITY` for static bodies).
    #[must_use]
    pub fn mass(&self) -> f64 {
        inverse_or_infinity(self.inv_mass)
    }

    /// Get the moment of inertia (`INFINITY` for static bodies).
    #[must_use]
    pub fn moment(&self) -> f64 {
        inverse_or_infinity(self.inv_moment)
    }

    /// Whether neither impulses nor torques can move this body.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.inv_mass == 0.0 && self.inv_moment == 0.0
    }

    /// Rotate a body-local offset into world orientation (no translation).
    #[must_use]
    pub fn rotate(&self, local: &Vector2<f64>) -> Vector2<f64> {
        self.rotation * local
    }

    /// Transform a point from body-local to world coordinates.
    #[must_use]
    pub fn local_to_world(&self, local: &Point2<f64>) -> Point2<f64> {
        self.position + self.rotation * local.coords
    }

    /// Transform a point from world to body-local coordinates.
    #[must_use]
    pub fn world_to_local(&self, world: &Point2<f64>) -> Point2<f64> {
        Point2::from(self.rotation.inverse() * (world - self.position))
    }

    /// Velocity of the material point at world-oriented offset `r` from the
    /// center of gravity.
    #[must_use]
    pub fn velocity_at_offset(&self, r: &Vector2<f64>) -> Vector2<f64> {
        self.linear_velocity + cross_scalar(self.angular_velocity, r)
    }

    /// Apply an impulse `j` at world-oriented offset `r` from the center of
    /// gravity. Only velocities change.
    pub fn apply_impulse(&mut self, j: &Vector2<f64>, r: &Vector2<f64>) {
        self.linear_velocity += j * self.inv_mass;
        self.angular_velocity += self.inv_moment * crate::math::cross(r, j);
    }

    /// Check that position, angle and velocities are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.angle.is_finite()
            && self.linear_velocity.iter().all(|x| x.is_finite())
            && self.angular_velocity.is_finite()
    }
}

fn inverse_or_zero(value: f64) -> f64 {
    if value.is_infinite() {
        0.0
    } else {
        1.0 / value
    }
}

fn inverse_or_infinity(value: f64) -> f64 {
    if value == 0.0 {
        f64::INFINITY
    } else {
        1.0 / value
    }
}

/// Mass and moment of inertia of a planar body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Total mass.
    pub mass: f64,
    /// Moment of inertia about the center of gravity.
    pub moment: f64,
}

impl MassProperties {
    /// Create mass properties with given values.
    #[must_use]
    pub const fn new(mass: f64, moment: f64) -> Self {
        Self { mass, moment }
    }

    /// Hollow circle (ring) with inner and outer radius, offset from the
    /// body origin. A solid disc has `r_inner = 0`.
    #[must_use]
    pub fn circle(mass: f64, r_inner: f64, r_outer: f64, offset: Vector2<f64>) -> Self {
        let moment = mass * (0.5 * (r_inner * r_inner + r_outer * r_outer) + offset.norm_squared());
        Self { mass, moment }
    }

    /// Thin line segment between `a` and `b` (body-local).
    #[must_use]
    pub fn segment(mass: f64, a: Vector2<f64>, b: Vector2<f64>) -> Self {
        let offset = (a + b) * 0.5;
        let length_sq = (b - a).norm_squared();
        Self {
            mass,
            moment: mass * (length_sq / 12.0 + offset.norm_squared()),
        }
    }

    /// Solid convex polygon given counter-clockwise body-local vertices.
    #[must_use]
    pub fn polygon(mass: f64, vertices: &[Vector2<f64>], offset: Vector2<f64>) -> Self {
        let mut sum1 = 0.0;
        let mut sum2 = 0.0;
        for (i, v) in vertices.iter().enumerate() {
            let v1 = v + offset;
            let v2 = vertices[(i + 1) % vertices.len()] + offset;

            let a = crate::math::cross(&v2, &v1);
            let b = v1.dot(&v1) + v1.dot(&v2) + v2.dot(&v2);

            sum1 += a * b;
            sum2 += a;
        }

        let moment = if sum2 == 0.0 {
            0.0
        } else {
            (mass * sum1) / (6.0 * sum2)
        };
        Self { mass, moment }
    }

    /// Solid axis-aligned box centered on the body origin.
    #[must_use]
    pub fn box_shape(mass: f64, width: f64, height: f64) -> Self {
        Self {
            mass,
            moment: mass * (width * width + height * height) / 12.0,
        }
    }

    /// Area of a hollow circle.
    #[must_use]
    pub fn area_circle(r_inner: f64, r_outer: f64) -> f64 {
        std::f64::consts::PI * (r_outer * r_outer - r_inner * r_inner).abs()
    }

    /// Area of a segment with rounded caps of radius `r`.
    #[must_use]
    pub fn area_segment(a: Vector2<f64>, b: Vector2<f64>, r: f64) -> f64 {
        2.0 * r * (a - b).norm() + std::f64::consts::PI * r * r
    }

    /// Signed area of a polygon (positive for counter-clockwise winding).
    #[must_use]
    pub fn area_polygon(vertices: &[Vector2<f64>]) -> f64 {
        let doubled: f64 = vertices
            .iter()
            .enumerate()
            .map(|(i, v)| crate::math::cross(v, &vertices[(i + 1) % vertices.len()]))
            .sum();
        doubled * 0.5
    }

    /// Validate the mass properties.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidMassProperties`] if the mass or moment is
    /// not positive.
    pub fn validate(&self) -> Result<()> {
        if self.mass.is_nan() || self.mass <= 0.0 {
            return Err(SimError::invalid_mass(format!(
                "mass must be positive, got {}",
                self.mass
            )));
        }
        if self.moment.is_nan() || self.moment <= 0.0 {
            return Err(SimError::invalid_mass(format!(
                "moment must be positive, got {}",
                self.moment
            )));
        }
        Ok(())
    }
}

/// Insertion-ordered storage for bodies, addressed by [`BodyId`].
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodySet {
    bodies: Vec<Body>,
}

impl BodySet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a body, returning its ID.
    pub fn insert(&mut self, body: Body) -> BodyId {
        let id = BodyId::new(self.bodies.len());
        self.bodies.push(body);
        id
    }

    /// Number of bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether the set has no bodies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Look up a body.
    #[must_use]
    pub fn get(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.raw())
    }

    /// Look up a body mutably.
    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id.raw())
    }

    /// Borrow two distinct bodies at once.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] if either ID is unknown and
    /// [`SimError::SameBody`] if both IDs are equal.
    pub fn pair(&self, a: BodyId, b: BodyId) -> Result<(&Body, &Body)> {
        if a == b {
            return Err(SimError::SameBody(a.raw()));
        }
        let body_a = self.get(a).ok_or(SimError::InvalidBodyId(a.raw()))?;
        let body_b = self.get(b).ok_or(SimError::InvalidBodyId(b.raw()))?;
        Ok((body_a, body_b))
    }

    /// Borrow two distinct bodies mutably at once.
    ///
    /// # Errors
    ///
    /// Same conditions as [`BodySet::pair`].
    pub fn pair_mut(&mut self, a: BodyId, b: BodyId) -> Result<(&mut Body, &mut Body)> {
        let len = self.bodies.len();
        if a == b {
            return Err(SimError::SameBody(a.raw()));
        }
        if a.raw() >= len {
            return Err(SimError::InvalidBodyId(a.raw()));
        }
        if b.raw() >= len {
            return Err(SimError::InvalidBodyId(b.raw()));
        }

        if a.raw() < b.raw() {
            let (head, tail) = self.bodies.split_at_mut(b.raw());
            Ok((&mut head[a.raw()], &mut tail[0]))
        } else {
            let (head, tail) = self.bodies.split_at_mut(a.raw());
            Ok((&mut tail[0], &mut head[b.raw()]))
        }
    }

    /// Iterate bodies with their IDs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &Body)> {
        self.bodies
            .iter()
            .enumerate()
            .map(|(i, body)| (BodyId::new(i), body))
    }

    /// Iterate bodies mutably in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (BodyId, &mut Body)> {
        self.bodies
            .iter_mut()
            .enumerate()
            .map(|(i, body)| (BodyId::new(i), body))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_static_body_has_zero_inverses() {
        let body = Body::new_static();
        assert_eq!(body.inv_mass(), 0.0);
        assert_eq!(body.inv_moment(), 0.0);
        assert!(body.is_static());
        assert!(body.mass().is_infinite());
    }

    #[test]
    fn test_impulse_on_static_body_is_ignored() {
        let mut body = Body::new_static();
        body.apply_impulse(&Vector2::new(10.0, -3.0), &Vector2::new(1.0, 1.0));
        assert_eq!(body.linear_velocity, Vector2::zeros());
        assert_eq!(body.angular_velocity, 0.0);
    }

    #[test]
    fn test_off_center_impulse_spins() {
        let mut body = Body::new(1.0, 2.0);
        // Upward impulse at +x offset produces counter-clockwise spin
        body.apply_impulse(&Vector2::new(0.0, 1.0), &Vector2::new(1.0, 0.0));
        assert_relative_eq!(body.linear_velocity.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(body.angular_velocity, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_local_world_round_trip() {
        let body = Body::new(1.0, 1.0)
            .with_position(Point2::new(3.0, -1.0))
            .with_angle(std::f64::consts::FRAC_PI_2);

        let local = Point2::new(1.0, 0.0);
        let world = body.local_to_world(&local);
        assert_relative_eq!(world.x, 3.0, epsilon = 1e-12);
        assert_relative_eq!(world.y, 0.0, epsilon = 1e-12);

        let back = body.world_to_local(&world);
        assert_relative_eq!(back.x, local.x, epsilon = 1e-12);
        assert_relative_eq!(back.y, local.y, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_is_not_wrapped() {
        let mut body = Body::new(1.0, 1.0);
        body.set_angle(5.0 * std::f64::consts::PI);
        assert_relative_eq!(body.angle(), 5.0 * std::f64::consts::PI);
        assert_relative_eq!(body.rotation().cos_angle(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_moment_helpers() {
        let disc = MassProperties::circle(2.0, 0.0, 1.0, Vector2::zeros());
        assert_relative_eq!(disc.moment, 1.0, epsilon = 1e-12);

        let square = MassProperties::box_shape(12.0, 1.0, 1.0);
        assert_relative_eq!(square.moment, 2.0, epsilon = 1e-12);

        let verts = [
            Vector2::new(-0.5, -0.5),
            Vector2::new(0.5, -0.5),
            Vector2::new(0.5, 0.5),
            Vector2::new(-0.5, 0.5),
        ];
        let poly = MassProperties::polygon(12.0, &verts, Vector2::zeros());
        assert_relative_eq!(poly.moment.abs(), square.moment, epsilon = 1e-12);
        assert_relative_eq!(MassProperties::area_polygon(&verts), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mass_validation() {
        assert!(MassProperties::new(1.0, 1.0).validate().is_ok());
        assert!(MassProperties::new(0.0, 1.0).validate().is_err());
        assert!(MassProperties::new(1.0, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_pair_mut_order_and_errors() {
        let mut set = BodySet::new();
        let a = set.insert(Body::new(1.0, 1.0));
        let b = set.insert(Body::new(2.0, 1.0));

        let (body_b, body_a) = set.pair_mut(b, a).unwrap();
        assert_relative_eq!(body_b.mass(), 2.0);
        assert_relative_eq!(body_a.mass(), 1.0);

        assert!(matches!(set.pair_mut(a, a), Err(SimError::SameBody(0))));
        assert!(matches!(
            set.pair_mut(a, BodyId::new(9)),
            Err(SimError::InvalidBodyId(9))
        ));
    }
}
