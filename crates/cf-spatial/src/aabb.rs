//! Axis-aligned bounding boxes in the plane.
//!
//! # Example
//!
//! ```
//! use cf_spatial::Aabb;
//! use nalgebra::Point2;
//!
//! let a = Aabb::from_edges(0.0, 0.0, 2.0, 2.0);
//! let b = Aabb::from_edges(1.0, 1.0, 3.0, 3.0);
//!
//! assert!(a.intersects(&b));
//! assert_eq!(a.union(&b), Aabb::from_edges(0.0, 0.0, 3.0, 3.0));
//! assert_eq!(a.merged_area(&b), 9.0);
//! ```

use nalgebra::{Point2, Vector2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in world coordinates.
///
/// `min` is the left/bottom corner, `max` the right/top corner.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Left/bottom corner.
    pub min: Point2<f64>,
    /// Right/top corner.
    pub max: Point2<f64>,
}

impl Aabb {
    /// Creates a new AABB from two corners.
    ///
    /// The corners are automatically reordered if necessary.
    ///
    /// # Example
    ///
    /// ```
    /// use cf_spatial::Aabb;
    /// use nalgebra::Point2;
    ///
    /// let aabb = Aabb::new(Point2::new(10.0, 0.0), Point2::new(0.0, 10.0));
    /// assert_eq!(aabb.min, Point2::new(0.0, 0.0));
    /// assert_eq!(aabb.max, Point2::new(10.0, 10.0));
    /// ```
    #[must_use]
    pub fn new(a: Point2<f64>, b: Point2<f64>) -> Self {
        Self {
            min: Point2::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point2::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Creates an AABB from its left, bottom, right and top edges.
    #[must_use]
    pub fn from_edges(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            min: Point2::new(left, bottom),
            max: Point2::new(right, top),
        }
    }

    /// Creates a zero-size AABB at a point.
    #[must_use]
    pub fn from_point(point: Point2<f64>) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Creates an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Point2<f64>, half_extents: Vector2<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Returns the center point.
    #[must_use]
    pub fn center(&self) -> Point2<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Width along x.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Height along y.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Area of the box.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Area of the union of this box and `other`, without building it.
    #[must_use]
    pub fn merged_area(&self, other: &Self) -> f64 {
        (self.max.x.max(other.max.x) - self.min.x.min(other.min.x))
            * (self.max.y.max(other.max.y) - self.min.y.min(other.min.y))
    }

    /// Manhattan distance between the two centers, doubled.
    ///
    /// A cheap closeness measure used to break insertion cost ties.
    #[must_use]
    pub fn proximity(&self, other: &Self) -> f64 {
        (self.min.x + self.max.x - other.min.x - other.max.x).abs()
            + (self.min.y + self.max.y - other.min.y - other.max.y).abs()
    }

    /// Checks if this AABB intersects another AABB.
    ///
    /// Touching edges count as intersecting.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Checks if `other` lies entirely inside this AABB.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.min.x <= other.min.x
            && self.max.x >= other.max.x
            && self.min.y <= other.min.y
            && self.max.y >= other.max.y
    }

    /// Returns a new AABB that is the union of this AABB and another.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: Point2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// Fraction along the segment `a -> b` at which it first enters the box.
    ///
    /// Returns `0.0` when `a` is already inside and `f64::INFINITY` when the
    /// segment misses.
    ///
    /// # Example
    ///
    /// ```
    /// use cf_spatial::Aabb;
    /// use nalgebra::Point2;
    ///
    /// let aabb = Aabb::from_edges(2.0, -1.0, 3.0, 1.0);
    /// let t = aabb.segment_fraction(&Point2::new(0.0, 0.0), &Point2::new(10.0, 0.0));
    /// assert_eq!(t, 0.2);
    ///
    /// let miss = aabb.segment_fraction(&Point2::new(0.0, 5.0), &Point2::new(10.0, 5.0));
    /// assert!(miss.is_infinite());
    /// ```
    #[must_use]
    pub fn segment_fraction(&self, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
        let (txmin, txmax) = slab(self.min.x, self.max.x, a.x, b.x);
        let (tymin, tymax) = slab(self.min.y, self.max.y, a.y, b.y);

        let tmin = txmin.max(tymin);
        let tmax = txmax.min(tymax);

        if 0.0 <= tmax && tmin <= 1.0 && tmin <= tmax {
            tmin.max(0.0)
        } else {
            f64::INFINITY
        }
    }
}

/// Entry and exit fractions of `a -> b` through the slab `[lo, hi]`.
///
/// An edge exactly at the start coordinate maps to an infinite fraction, so
/// a segment parallel to the slab never produces `0 * inf`.
fn slab(lo: f64, hi: f64, a: f64, b: f64) -> (f64, f64) {
    let inv = 1.0 / (b - a);
    let t1 = if lo == a {
        f64::NEG_INFINITY
    } else {
        (lo - a) * inv
    };
    let t2 = if hi == a {
        f64::INFINITY
    } else {
        (hi - a) * inv
    };
    (t1.min(t2), t1.max(t2))
}

impl Default for Aabb {
    fn default() -> Self {
        Self::from_point(Point2::origin())
    }
}
